use super::interpolate::*;
use super::stats::*;
use ndarray::{array, Array1, Array3};

#[test]
fn test_lin_interp() {
    assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
}

#[test]
fn test_method_parse() {
    assert_eq!("cubic".parse::<InterpMethod>().unwrap(), InterpMethod::Cubic);
    assert_eq!("Linear".parse::<InterpMethod>().unwrap(), InterpMethod::Linear);
    assert!("spline".parse::<InterpMethod>().is_err());
}

#[test]
fn test_descending_source_axis() {
    let source = [2.0, 1.0, 0.0];
    let interp = AxisInterpolator::new(&source, &[0.5, 1.5], InterpMethod::Linear).unwrap();
    let input = array![20.0, 10.0, 0.0];
    let mut output = Array1::zeros(2);
    interp.apply(input.view(), output.view_mut()).unwrap();
    assert!((output[0] - 5.0).abs() < 1e-12);
    assert!((output[1] - 15.0).abs() < 1e-12);
}

#[test]
fn test_non_monotonic_axis_rejected() {
    let err = AxisInterpolator::new(&[0.0, 1.0, 1.0], &[0.5], InterpMethod::Cubic).unwrap_err();
    assert_eq!(err, InterpError::NonMonotonic(2));
}

#[test]
fn test_nanmean_time_all_nan_cell() {
    let mut data = Array3::<f32>::zeros((2, 1, 2));
    data[[0, 0, 0]] = f32::NAN;
    data[[1, 0, 0]] = f32::NAN;
    data[[0, 0, 1]] = 1.0;
    data[[1, 0, 1]] = 3.0;
    let mean = nanmean_time(data.view());
    assert!(mean[[0, 0]].is_nan());
    assert_eq!(mean[[0, 1]], 2.0);
}
