use ndarray::{Array1, Array2, Axis};

/// Relative spread below which a column is treated as constant
const CONSTANT_COLUMN_EPSILON: f64 = 1e-12;
const POWER_ITERATIONS: usize = 1000;
const POWER_TOLERANCE: f64 = 1e-12;

/// Column statistics used to standardize a feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Standardization {
    pub means: Array1<f64>,
    pub std_devs: Array1<f64>,
}

/// Scale every column to zero mean and unit population variance.
/// Constant columns become all zeros.
pub fn standardize(data: &Array2<f64>) -> (Array2<f64>, Standardization) {
    let n_cols = data.ncols();
    let means = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_cols));
    let std_devs = if data.nrows() == 0 {
        Array1::zeros(n_cols)
    } else {
        data.std_axis(Axis(0), 0.0)
    };

    let mut scaled = data.clone();
    for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
        let mean = means[j];
        let std = std_devs[j];
        if std <= CONSTANT_COLUMN_EPSILON * mean.abs().max(1.0) {
            column.fill(0.0);
        } else {
            column.mapv_inplace(|value| (value - mean) / std);
        }
    }

    (scaled, Standardization { means, std_devs })
}

/// Project standardized rows onto their first two principal components.
///
/// Components come from power iteration with deflation on the population
/// covariance matrix, starting from a fixed vector. Each component is
/// oriented so its largest-magnitude loading is positive. A degenerate
/// component (no remaining variance) projects every row to zero.
pub fn project_2d(data: &Array2<f64>) -> Array2<f64> {
    let n_rows = data.nrows();
    let n_cols = data.ncols();
    let mut projected = Array2::zeros((n_rows, 2));
    if n_rows == 0 || n_cols == 0 {
        return projected;
    }

    let mut covariance = data.t().dot(data) / n_rows as f64;

    for component in 0..2.min(n_cols) {
        let Some((eigenvalue, vector)) = dominant_eigenvector(&covariance) else {
            break;
        };

        let scores = data.dot(&vector);
        projected.column_mut(component).assign(&scores);

        // Deflate: remove the found component from the covariance
        let outer = outer_product(&vector, &vector) * eigenvalue;
        covariance = covariance - outer;
    }

    projected
}

fn outer_product(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let mut result = Array2::zeros((a.len(), b.len()));
    for ((i, j), value) in result.indexed_iter_mut() {
        *value = a[i] * b[j];
    }
    result
}

fn dominant_eigenvector(matrix: &Array2<f64>) -> Option<(f64, Array1<f64>)> {
    let n = matrix.nrows();
    // Fixed, non-symmetric start so no component is trivially orthogonal to it
    let mut vector: Array1<f64> = (0..n).map(|i| 1.0 + i as f64 * 0.1).collect();
    vector /= l2_norm(&vector);

    for _ in 0..POWER_ITERATIONS {
        let next = matrix.dot(&vector);
        let norm = l2_norm(&next);
        if norm <= POWER_TOLERANCE {
            return None;
        }
        let next = next / norm;
        let delta = l2_norm(&(&next - &vector));
        vector = next;
        if delta <= POWER_TOLERANCE {
            break;
        }
    }

    orient(&mut vector);
    let eigenvalue = vector.dot(&matrix.dot(&vector));
    if eigenvalue <= POWER_TOLERANCE {
        return None;
    }
    Some((eigenvalue, vector))
}

fn l2_norm(vector: &Array1<f64>) -> f64 {
    vector.dot(vector).sqrt()
}

/// Flip the vector so its largest-magnitude entry is positive
fn orient(vector: &mut Array1<f64>) {
    let mut pivot = 0;
    for (i, value) in vector.iter().enumerate() {
        if value.abs() > vector[pivot].abs() {
            pivot = i;
        }
    }
    if vector[pivot] < 0.0 {
        vector.mapv_inplace(|v| -v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let data = array![[1.0, 10.0, 5.0], [2.0, 20.0, 5.0], [3.0, 30.0, 5.0]];
        let (scaled, stats) = standardize(&data);

        for j in 0..2 {
            let column = scaled.column(j);
            assert!(column.sum().abs() < 1e-9);
            let variance = column.mapv(|v| v * v).sum() / 3.0;
            assert!((variance - 1.0).abs() < 1e-9);
        }
        // Constant column
        assert!(scaled.column(2).iter().all(|v| *v == 0.0));
        assert_eq!(stats.means[1], 20.0);
    }

    #[test]
    fn test_projection_follows_dominant_direction() {
        // Points on the line y = x carry all variance along (1, 1)
        let data = array![[-2.0, -2.0], [-1.0, -1.0], [1.0, 1.0], [2.0, 2.0]];
        let projected = project_2d(&data);

        let expected = std::f64::consts::SQRT_2;
        assert!((projected[[3, 0]] - 2.0 * expected).abs() < 1e-6);
        assert!((projected[[0, 0]] + 2.0 * expected).abs() < 1e-6);
        // No variance left for the second component
        assert!(projected.column(1).iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let data = array![
            [0.5, -1.2, 0.3, 2.0],
            [-0.7, 0.4, 1.1, -0.5],
            [1.3, 0.9, -0.8, 0.1],
            [-1.1, -0.1, -0.6, -1.6]
        ];
        assert_eq!(project_2d(&data), project_2d(&data));
    }

    #[test]
    fn test_degenerate_input() {
        let data = Array2::<f64>::zeros((3, 4));
        let projected = project_2d(&data);
        assert_eq!(projected.dim(), (3, 2));
        assert!(projected.iter().all(|v| *v == 0.0));
    }
}
