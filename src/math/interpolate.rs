use ndarray::{ArrayView1, ArrayViewMut1};
use num_traits::Float;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Source axis is empty")]
    EmptyAxis,

    #[error("Source axis is not strictly monotonic at index {0}")]
    NonMonotonic(usize),

    #[error("Line length {got} does not match source axis length {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Unknown interpolation method: {0}")]
    UnknownMethod(String),
}

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Interpolation method used for regridding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpMethod {
    Nearest,
    Linear,
    /// Cubic spline, not-a-knot ends
    #[default]
    Cubic,
}

impl FromStr for InterpMethod {
    type Err = InterpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(InterpMethod::Nearest),
            "linear" => Ok(InterpMethod::Linear),
            "cubic" => Ok(InterpMethod::Cubic),
            other => Err(InterpError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for InterpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterpMethod::Nearest => "nearest",
            InterpMethod::Linear => "linear",
            InterpMethod::Cubic => "cubic",
        };
        write!(f, "{}", name)
    }
}

/// Position of a target coordinate inside the ascending source axis
#[derive(Debug, Clone, Copy)]
struct Stencil {
    lower: usize,
    frac: f64,
}

/// Tridiagonal system for the knot slopes of a cubic spline on a fixed axis.
///
/// Four or more knots use not-a-knot ends (third derivative continuous at
/// the second and second-to-last knots); three knots fall back to natural
/// ends. Only the right-hand side depends on the data, so the forward-sweep
/// factors are computed once per axis.
#[derive(Debug, Clone)]
struct SplineFactors {
    h: Vec<f64>,
    not_a_knot: bool,
    lower: Vec<f64>,
    c_prime: Vec<f64>,
    denom: Vec<f64>,
}

impl SplineFactors {
    fn new(x: &[f64]) -> Self {
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let not_a_knot = n >= 4;

        let mut lower = vec![0.0; n];
        let mut diag = vec![0.0; n];
        let mut upper = vec![0.0; n];
        for i in 1..n - 1 {
            lower[i] = h[i];
            diag[i] = 2.0 * (h[i - 1] + h[i]);
            upper[i] = h[i - 1];
        }
        if not_a_knot {
            diag[0] = h[1];
            upper[0] = h[0] + h[1];
            lower[n - 1] = h[n - 3] + h[n - 2];
            diag[n - 1] = h[n - 3];
        } else {
            diag[0] = 2.0;
            upper[0] = 1.0;
            lower[n - 1] = 1.0;
            diag[n - 1] = 2.0;
        }

        let mut c_prime = vec![0.0; n];
        let mut denom = vec![0.0; n];
        for i in 0..n {
            let d = if i == 0 {
                diag[0]
            } else {
                diag[i] - lower[i] * c_prime[i - 1]
            };
            denom[i] = d;
            c_prime[i] = upper[i] / d;
        }

        Self {
            h,
            not_a_knot,
            lower,
            c_prime,
            denom,
        }
    }

    /// First derivative of the spline at every knot
    fn slopes(&self, y: &[f64]) -> Vec<f64> {
        let n = y.len();
        let h = &self.h;
        let m: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

        let mut rhs = vec![0.0; n];
        for i in 1..n - 1 {
            rhs[i] = 3.0 * (h[i] * m[i - 1] + h[i - 1] * m[i]);
        }
        if self.not_a_knot {
            let d = h[0] + h[1];
            rhs[0] = ((h[0] + 2.0 * d) * h[1] * m[0] + h[0] * h[0] * m[1]) / d;
            let (last, prev) = (h[n - 2], h[n - 3]);
            let d = last + prev;
            rhs[n - 1] = (last * last * m[n - 3] + (2.0 * d + last) * prev * m[n - 2]) / d;
        } else {
            rhs[0] = 3.0 * m[0];
            rhs[n - 1] = 3.0 * m[n - 2];
        }

        let mut d_prime = vec![0.0; n];
        for i in 0..n {
            d_prime[i] = if i == 0 {
                rhs[0] / self.denom[0]
            } else {
                (rhs[i] - self.lower[i] * d_prime[i - 1]) / self.denom[i]
            };
        }

        let mut slopes = d_prime;
        for i in (0..n - 1).rev() {
            slopes[i] -= self.c_prime[i] * slopes[i + 1];
        }
        slopes
    }

    /// Cubic Hermite evaluation on the interval of `stencil`
    fn evaluate(&self, y: &[f64], slopes: &[f64], stencil: Stencil) -> f64 {
        let k = stencil.lower;
        if k + 1 >= y.len() {
            return y[k];
        }
        let h = self.h[k];
        let t = stencil.frac;
        let t2 = t * t;
        let t3 = t2 * t;
        (2.0 * t3 - 3.0 * t2 + 1.0) * y[k]
            + (t3 - 2.0 * t2 + t) * h * slopes[k]
            + (3.0 * t2 - 2.0 * t3) * y[k + 1]
            + (t3 - t2) * h * slopes[k + 1]
    }
}

/// One-dimensional interpolation from a fixed source axis onto a fixed target axis.
///
/// Target coordinates outside the source span map to NaN. A descending source
/// axis is accepted and handled by reading lines back to front.
#[derive(Debug, Clone)]
pub struct AxisInterpolator {
    method: InterpMethod,
    source_len: usize,
    descending: bool,
    stencils: Vec<Option<Stencil>>,
    spline: Option<SplineFactors>,
}

impl AxisInterpolator {
    pub fn new(source: &[f64], target: &[f64], method: InterpMethod) -> Result<Self, InterpError> {
        if source.is_empty() {
            return Err(InterpError::EmptyAxis);
        }

        let descending = source.len() > 1 && source[1] < source[0];
        let ascending: Vec<f64> = if descending {
            source.iter().rev().copied().collect()
        } else {
            source.to_vec()
        };
        if let Some(i) = ascending.windows(2).position(|w| !(w[1] > w[0])) {
            let index = if descending { source.len() - 2 - i } else { i + 1 };
            return Err(InterpError::NonMonotonic(index));
        }

        let stencils = target.iter().map(|&t| locate(&ascending, t)).collect();
        let spline = match method {
            InterpMethod::Cubic if ascending.len() > 2 => Some(SplineFactors::new(&ascending)),
            _ => None,
        };

        Ok(Self {
            method,
            source_len: source.len(),
            descending,
            stencils,
            spline,
        })
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn target_len(&self) -> usize {
        self.stencils.len()
    }

    /// Interpolate one line of source values into `output`
    pub fn apply(
        &self,
        input: ArrayView1<f64>,
        mut output: ArrayViewMut1<f64>,
    ) -> Result<(), InterpError> {
        if input.len() != self.source_len {
            return Err(InterpError::LengthMismatch {
                expected: self.source_len,
                got: input.len(),
            });
        }
        if output.len() != self.target_len() {
            return Err(InterpError::LengthMismatch {
                expected: self.target_len(),
                got: output.len(),
            });
        }

        let y: Vec<f64> = if self.descending {
            input.iter().rev().copied().collect()
        } else {
            input.iter().copied().collect()
        };

        match (self.method, &self.spline) {
            (InterpMethod::Cubic, Some(spline)) => {
                // A NaN anywhere in the line poisons the whole spline
                if y.iter().any(|v| v.is_nan()) {
                    output.fill(f64::NAN);
                    return Ok(());
                }
                let slopes = spline.slopes(&y);
                for (out, stencil) in output.iter_mut().zip(&self.stencils) {
                    *out = match stencil {
                        Some(s) => spline.evaluate(&y, &slopes, *s),
                        None => f64::NAN,
                    };
                }
            }
            (InterpMethod::Nearest, _) => {
                for (out, stencil) in output.iter_mut().zip(&self.stencils) {
                    *out = match stencil {
                        Some(s) if s.frac > 0.5 => y[s.lower + 1],
                        Some(s) => y[s.lower],
                        None => f64::NAN,
                    };
                }
            }
            _ => {
                for (out, stencil) in output.iter_mut().zip(&self.stencils) {
                    *out = match stencil {
                        Some(s) if s.lower + 1 < y.len() => {
                            lin_interp(y[s.lower], y[s.lower + 1], s.frac)
                        }
                        Some(s) => y[s.lower],
                        None => f64::NAN,
                    };
                }
            }
        }
        Ok(())
    }
}

fn locate(x: &[f64], t: f64) -> Option<Stencil> {
    let n = x.len();
    if !t.is_finite() {
        return None;
    }
    if n == 1 {
        return (t == x[0]).then_some(Stencil { lower: 0, frac: 0.0 });
    }

    let tolerance = (x[n - 1] - x[0]).abs() * 1e-12;
    if t < x[0] - tolerance || t > x[n - 1] + tolerance {
        return None;
    }

    let upper = x.partition_point(|&v| v <= t);
    let lower = upper.saturating_sub(1).min(n - 2);
    let frac = ((t - x[lower]) / (x[lower + 1] - x[lower])).clamp(0.0, 1.0);
    Some(Stencil { lower, frac })
}
