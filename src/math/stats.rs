use ndarray::{Array2, ArrayView2, ArrayView3, Axis, Zip};

/// Mean over the leading (time) axis, skipping NaN samples.
///
/// Cells with no finite sample are NaN.
pub fn nanmean_time(data: ArrayView3<f32>) -> Array2<f32> {
    let (_, nlat, nlon) = data.dim();
    let mut acc = MeanAccumulator::new(nlat, nlon);
    for slice in data.axis_iter(Axis(0)) {
        acc.add_f32(slice);
    }
    acc.mean().mapv(|v| v as f32)
}

/// Running per-cell sum and sample count for NaN-skipping means
#[derive(Debug, Clone)]
pub struct MeanAccumulator {
    sum: Array2<f64>,
    count: Array2<u32>,
}

impl MeanAccumulator {
    pub fn new(nlat: usize, nlon: usize) -> Self {
        Self {
            sum: Array2::zeros((nlat, nlon)),
            count: Array2::zeros((nlat, nlon)),
        }
    }

    pub fn add_f32(&mut self, slice: ArrayView2<f32>) {
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(slice)
            .for_each(|sum, count, &v| {
                if !v.is_nan() {
                    *sum += v as f64;
                    *count += 1;
                }
            });
    }

    pub fn mean(&self) -> Array2<f64> {
        Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|&sum, &count| {
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            })
    }
}
