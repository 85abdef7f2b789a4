use serde::{Deserialize, Serialize};

pub type Domain = [f64; 2];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainRanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Domain>,
}

impl DomainRanges {
    fn axes(&self) -> impl Iterator<Item = (Axis, Domain)> {
        [(Axis::X, self.x), (Axis::Y, self.y), (Axis::Z, self.z)]
            .into_iter()
            .filter_map(|(axis, domain)| domain.map(|d| (axis, d)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

const PADDING: f64 = 0.02;

/// Uses the cluster's own ranges when it has them; otherwise every axis gets
/// the global extent of all coordinates, widened by 2% on each side.
#[must_use]
pub fn set_range(
    provided: Option<DomainRanges>,
    x: &[f64],
    y: &[f64],
    z: Option<&[f64]>,
) -> DomainRanges {
    if let Some(provided) = provided {
        return provided;
    }

    let all = x.iter().chain(y).chain(z.unwrap_or_default()).copied();
    let (min, max) = all.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
    .unwrap_or((0.0, 0.0));

    let padding = (max - min) * PADDING;
    let domain = [min - padding, max + padding];

    DomainRanges {
        x: Some(domain),
        y: Some(domain),
        z: z.map(|_| domain),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    Cube,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aspect {
    pub mode: AspectMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// Ratios of each axis extent to the largest one, for equal-aspect 3d plots.
#[must_use]
pub fn compute_aspect_ratios(range: &DomainRanges) -> Aspect {
    let extents: Vec<(Axis, f64)> = range
        .axes()
        .map(|(axis, [first, last])| (axis, (last - first).max(0.0)))
        .collect();

    let largest = extents.iter().map(|(_, e)| *e).fold(0.0, f64::max);
    let all_equal = extents.windows(2).all(|w| w[0].1 == w[1].1);

    let mut aspect = Aspect {
        mode: if all_equal { AspectMode::Cube } else { AspectMode::Manual },
        x: None,
        y: None,
        z: None,
    };

    for (axis, extent) in extents {
        let ratio = if largest > 0.0 { extent / largest } else { 1.0 };
        match axis {
            Axis::X => aspect.x = Some(ratio),
            Axis::Y => aspect.y = Some(ratio),
            Axis::Z => aspect.z = Some(ratio),
        }
    }

    aspect
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn padded_global_range() {
        let range = set_range(None, &[0.0, 50.0], &[-50.0, 10.0], None);

        assert_eq!(range.x, Some([-52.0, 52.0]));
        assert_eq!(range.y, range.x);
        assert_eq!(range.z, None);
    }

    #[test]
    fn provided_range_wins() {
        let provided = DomainRanges {
            x: Some([0.0, 1.0]),
            y: Some([0.0, 2.0]),
            z: None,
        };

        assert_eq!(set_range(Some(provided), &[5.0], &[5.0], None), provided);
    }

    #[test]
    fn aspect_modes() {
        let cube = compute_aspect_ratios(&set_range(None, &[0.0, 1.0], &[0.0], Some(&[0.0])));
        assert_eq!(cube.mode, AspectMode::Cube);
        assert_eq!(cube.z, Some(1.0));

        let manual = compute_aspect_ratios(&DomainRanges {
            x: Some([0.0, 10.0]),
            y: Some([0.0, 5.0]),
            z: Some([0.0, 10.0]),
        });
        assert_eq!(
            manual,
            Aspect {
                mode: AspectMode::Manual,
                x: Some(1.0),
                y: Some(0.5),
                z: Some(1.0),
            }
        );
    }

    #[test]
    fn degenerate_extent() {
        let aspect = compute_aspect_ratios(&DomainRanges {
            x: Some([3.0, 3.0]),
            y: Some([3.0, 3.0]),
            z: None,
        });

        assert_eq!(aspect.x, Some(1.0));
    }
}
