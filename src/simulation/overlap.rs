use rayon::prelude::*;

use crate::flood::FloodRegion;
use crate::simulation::geometry::distance_m;

/// Above this many regions the pair scan runs on the rayon pool.
pub const PARALLEL_SCAN_THRESHOLD: usize = 64;

/// Two regions overlap when their centres are closer than the sum of their radii.
/// Touching circles (distance exactly equal to the sum) do not overlap.
pub fn overlaps(a: &FloodRegion, b: &FloodRegion) -> bool {
    distance_m(a.center, b.center) < a.radius + b.radius
}

/// Index of the first region in `others` that overlaps `region`, skipping any
/// entry with the same id.
pub fn find_overlap(region: &FloodRegion, others: &[FloodRegion]) -> Option<usize> {
    let hit = |other: &FloodRegion| other.id != region.id && overlaps(region, other);
    if others.len() > PARALLEL_SCAN_THRESHOLD {
        others.par_iter().position_first(hit)
    } else {
        others.iter().position(hit)
    }
}

/// All overlapping index pairs `(i, j)` with `i < j`, in ascending order.
pub fn overlapping_pairs(regions: &[FloodRegion]) -> Vec<(usize, usize)> {
    let row = |i: usize| -> Vec<(usize, usize)> {
        ((i + 1)..regions.len())
            .filter(|&j| regions[i].id != regions[j].id && overlaps(&regions[i], &regions[j]))
            .map(|j| (i, j))
            .collect()
    };
    if regions.len() > PARALLEL_SCAN_THRESHOLD {
        (0..regions.len()).into_par_iter().flat_map_iter(row).collect()
    } else {
        (0..regions.len()).flat_map(row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flood::{GeoPoint, Severity, Terrain};
    use crate::simulation::merge::new_region;

    fn region(id: u64, lat: f64, lon: f64, radius: f64) -> FloodRegion {
        new_region(
            id,
            "r".to_string(),
            GeoPoint::new(lat, lon),
            radius,
            radius * 5.0,
            Severity::Medium,
            Terrain::Flat,
        )
    }

    #[test]
    fn close_regions_overlap() {
        let a = region(1, 0.0, 0.0, 100.0);
        let b = region(2, 0.0, 0.0005, 100.0);
        assert!(overlaps(&a, &b));
    }

    #[test]
    fn distant_regions_do_not_overlap() {
        let a = region(1, 0.0, 0.0, 100.0);
        let b = region(2, 0.0, 0.01, 100.0);
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn touching_regions_do_not_overlap() {
        let gap = distance_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.001, 0.0));
        let a = region(1, 0.0, 0.0, gap / 2.0);
        let b = region(2, 0.001, 0.0, gap / 2.0);
        assert!(!overlaps(&a, &b));

        let c = region(3, 0.001, 0.0, gap / 2.0 + 0.01);
        assert!(overlaps(&a, &c));
    }

    #[test]
    fn overlap_is_symmetric() {
        let regions = [
            region(1, 10.0, 10.0, 120.0),
            region(2, 10.001, 10.001, 80.0),
            region(3, 10.003, 9.999, 300.0),
            region(4, 10.05, 10.05, 10.0),
            region(5, 60.0, 10.0, 500.0),
            region(6, 60.004, 10.006, 50.0),
        ];
        for a in &regions {
            for b in &regions {
                assert_eq!(overlaps(a, b), overlaps(b, a), "{} vs {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn find_overlap_skips_self() {
        let a = region(1, 0.0, 0.0, 100.0);
        let others = vec![a.clone()];
        assert_eq!(find_overlap(&a, &others), None);
    }

    #[test]
    fn find_overlap_returns_first_hit() {
        let a = region(1, 0.0, 0.0, 100.0);
        let others = vec![
            region(2, 1.0, 1.0, 10.0),
            region(3, 0.0, 0.0005, 100.0),
            region(4, 0.0, -0.0005, 100.0),
        ];
        assert_eq!(find_overlap(&a, &others), Some(1));
    }

    #[test]
    fn parallel_scan_agrees_with_serial() {
        let a = region(0, 0.0, 0.0, 100.0);
        let mut others: Vec<FloodRegion> = (1..200)
            .map(|i| region(i, 1.0 + i as f64 * 0.01, 0.0, 10.0))
            .collect();
        others.push(region(500, 0.0, 0.001, 100.0));
        others.push(region(501, 0.0, -0.001, 100.0));
        assert!(others.len() > PARALLEL_SCAN_THRESHOLD);
        assert_eq!(find_overlap(&a, &others), Some(199));
    }

    #[test]
    fn overlapping_pairs_lists_each_pair_once() {
        let regions = vec![
            region(1, 0.0, 0.0, 100.0),
            region(2, 0.0, 0.0005, 100.0),
            region(3, 0.0, 0.001, 100.0),
            region(4, 5.0, 5.0, 100.0),
        ];
        assert_eq!(overlapping_pairs(&regions), vec![(0, 1), (0, 2), (1, 2)]);
    }
}
