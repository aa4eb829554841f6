//! Terminal collation into dense arrays

use crate::source::DataSource;
use bsp_core::{BspError, BspResult, TimeSeriesBuffer};
use ndarray::{Array2, Array3};
use tracing::debug;

fn require_items(containers: &[TimeSeriesBuffer]) -> BspResult<()> {
    if containers.is_empty() {
        return Err(BspError::Empty {
            reason: "nothing to collate".to_string(),
        });
    }
    Ok(())
}

/// Concatenate containers vertically into `(Σ samples, channels)`
pub fn collate_2d(source: DataSource<'_>) -> BspResult<Array2<f32>> {
    let containers = source.materialize()?;
    require_items(&containers)?;

    let expected = containers[0].shape();
    let mut rows = 0;
    for (index, container) in containers.iter().enumerate() {
        if container.channels() != expected.1 {
            return Err(BspError::ShapeMismatch {
                index,
                expected,
                actual: container.shape(),
            });
        }
        rows += container.samples();
    }

    let mut values = Vec::with_capacity(rows * expected.1);
    for container in &containers {
        container.with_values(|data| values.extend_from_slice(data));
    }
    debug!(containers = containers.len(), rows, "Collated 2D");
    Array2::from_shape_vec((rows, expected.1), values).map_err(|e| BspError::Shape {
        expected: format!("({}, {})", rows, expected.1),
        actual: e.to_string(),
    })
}

/// Stack equally shaped containers into `(containers, samples, channels)`
pub fn collate_3d(source: DataSource<'_>) -> BspResult<Array3<f32>> {
    let containers = source.materialize()?;
    require_items(&containers)?;

    let expected = containers[0].shape();
    if let Some((index, container)) = containers
        .iter()
        .enumerate()
        .find(|(_, c)| c.shape() != expected)
    {
        return Err(BspError::ShapeMismatch {
            index,
            expected,
            actual: container.shape(),
        });
    }

    let (samples, channels) = expected;
    let mut values = Vec::with_capacity(containers.len() * samples * channels);
    for container in &containers {
        container.with_values(|data| values.extend_from_slice(data));
    }
    debug!(containers = containers.len(), samples, channels, "Collated 3D");
    Array3::from_shape_vec((containers.len(), samples, channels), values).map_err(|e| BspError::Shape {
        expected: format!("({}, {}, {})", containers.len(), samples, channels),
        actual: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(samples: usize, channels: usize, value: f32) -> TimeSeriesBuffer {
        TimeSeriesBuffer::from_vec(vec![value; samples * channels], channels, 10.0, None).unwrap()
    }

    #[test]
    fn test_collate_2d() {
        let source = DataSource::Eager(vec![filled(2, 3, 1.0), filled(4, 3, 2.0)]);
        let matrix = collate_2d(source).unwrap();
        assert_eq!(matrix.dim(), (6, 3));
        assert_eq!(matrix[[1, 2]], 1.0);
        assert_eq!(matrix[[2, 0]], 2.0);

        let source = DataSource::Eager(vec![filled(2, 3, 1.0), filled(2, 2, 1.0)]);
        assert!(matches!(
            collate_2d(source),
            Err(BspError::ShapeMismatch { index: 1, expected: (2, 3), actual: (2, 2) })
        ));
    }

    #[test]
    fn test_collate_3d() {
        let source = DataSource::Eager(vec![filled(4, 2, 1.0), filled(4, 2, 2.0), filled(4, 2, 3.0)]);
        let tensor = collate_3d(source).unwrap();
        assert_eq!(tensor.dim(), (3, 4, 2));
        assert_eq!(tensor[[0, 3, 1]], 1.0);
        assert_eq!(tensor[[2, 0, 0]], 3.0);

        let source = DataSource::Eager(vec![filled(4, 2, 1.0), filled(3, 2, 1.0)]);
        assert!(matches!(collate_3d(source), Err(BspError::ShapeMismatch { index: 1, .. })));
    }

    #[test]
    fn test_collate_empty() {
        assert!(matches!(collate_2d(DataSource::Eager(vec![])), Err(BspError::Empty { .. })));
        assert!(matches!(collate_3d(DataSource::Eager(vec![])), Err(BspError::Empty { .. })));
    }
}
