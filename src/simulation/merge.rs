use std::collections::VecDeque;

use tracing::debug;

use crate::flood::{spread_rate_for, FloodRegion, GeoPoint, RegionId, Severity, Terrain};
use crate::simulation::geometry::{distance_m, generate_polygon, midpoint};
use crate::simulation::overlap::find_overlap;

/// Build a fresh region with derived spread rate and geometry.
pub fn new_region(
    id: RegionId,
    report_id: String,
    center: GeoPoint,
    radius: f64,
    max_radius: f64,
    severity: Severity,
    terrain: Terrain,
) -> FloodRegion {
    debug_assert!(radius > 0.0 && radius <= max_radius, "radius {radius} outside (0, {max_radius}]");
    FloodRegion {
        id,
        report_ids: vec![report_id],
        center,
        radius,
        max_radius,
        spread_rate: spread_rate_for(severity, terrain),
        is_expanding: radius < max_radius,
        geometry_points: generate_polygon(center, radius),
        severity,
        water_level: severity.water_level(),
    }
}

/// Combine two overlapping regions into one whose circle covers both.
///
/// The survivor id is the larger-radius input's, ties going to the lower id.
/// The growth cap is raised to the covering radius when coverage alone exceeds
/// both inputs' caps.
pub fn merge(a: &FloodRegion, b: &FloodRegion, terrain: Terrain) -> FloodRegion {
    let (survivor, absorbed) = if a.radius > b.radius || (a.radius == b.radius && a.id <= b.id) {
        (a, b)
    } else {
        (b, a)
    };

    let center = midpoint(a.center, b.center);
    let radius = (distance_m(center, a.center) + a.radius)
        .max(distance_m(center, b.center) + b.radius);
    let max_radius = a.max_radius.max(b.max_radius).max(radius);
    let severity = a.severity.max(b.severity);

    let mut report_ids = survivor.report_ids.clone();
    report_ids.extend(absorbed.report_ids.iter().cloned());

    FloodRegion {
        id: survivor.id,
        report_ids,
        center,
        radius,
        max_radius,
        spread_rate: spread_rate_for(severity, terrain),
        is_expanding: radius < max_radius,
        geometry_points: generate_polygon(center, radius),
        severity,
        water_level: a.water_level.max(b.water_level),
    }
}

/// Result of an all-pairs merge pass.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Surviving regions, pairwise non-overlapping, in ascending id order.
    pub regions: Vec<FloodRegion>,
    /// (retired id, id it was merged into), in merge order.
    pub retired: Vec<(RegionId, RegionId)>,
}

impl MergeOutcome {
    pub fn merge_count(&self) -> usize {
        self.retired.len()
    }

    /// Final id that `id` ended up in, following chains of merges.
    pub fn resolve(&self, id: RegionId) -> RegionId {
        let mut current = id;
        while let Some(&(_, into)) = self.retired.iter().find(|(gone, _)| *gone == current) {
            current = into;
        }
        current
    }
}

/// Merge until no two regions overlap.
///
/// Each region is popped in turn and merged with anything it overlaps, whether
/// still pending or already settled, until it overlaps nothing; then it settles.
/// Settled regions are pairwise disjoint, and every merge removes one region, so
/// the pass ends after at most `n - 1` merges.
pub fn merge_all(regions: Vec<FloodRegion>, terrain: Terrain) -> MergeOutcome {
    let mut pending: VecDeque<FloodRegion> = regions.into();
    let mut settled: Vec<FloodRegion> = Vec::with_capacity(pending.len());
    let mut retired = Vec::new();

    while let Some(mut current) = pending.pop_front() {
        loop {
            let other = if let Some(i) = find_overlap(&current, pending.make_contiguous()) {
                pending.remove(i)
            } else if let Some(i) = find_overlap(&current, &settled) {
                Some(settled.remove(i))
            } else {
                None
            };
            let Some(other) = other else { break };

            let merged = merge(&current, &other, terrain);
            let gone = if merged.id == current.id { other.id } else { current.id };
            debug!(survivor = merged.id, retired = gone, radius = merged.radius, "Merged flood regions");
            retired.push((gone, merged.id));
            current = merged;
        }
        settled.push(current);
    }

    settled.sort_by_key(|r| r.id);
    MergeOutcome {
        regions: settled,
        retired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::overlap::{overlapping_pairs, overlaps};

    fn region(id: u64, lat: f64, lon: f64, radius: f64, max_radius: f64, severity: Severity) -> FloodRegion {
        new_region(
            id,
            format!("report-{id}"),
            GeoPoint::new(lat, lon),
            radius,
            max_radius,
            severity,
            Terrain::Flat,
        )
    }

    fn covers(outer: &FloodRegion, inner: &FloodRegion) -> bool {
        distance_m(outer.center, inner.center) + inner.radius <= outer.radius + 1e-6
    }

    #[test]
    fn merged_region_covers_both_inputs() {
        let a = region(1, 0.0, 0.0, 100.0, 500.0, Severity::High);
        let b = region(2, 0.0, 0.0005, 100.0, 500.0, Severity::Low);
        assert!(overlaps(&a, &b));

        let m = merge(&a, &b, Terrain::Flat);
        assert!(covers(&m, &a));
        assert!(covers(&m, &b));
        assert_eq!(m.center, GeoPoint::new(0.0, 0.00025));
    }

    #[test]
    fn merged_attributes() {
        let a = region(1, 0.0, 0.0, 100.0, 400.0, Severity::Low);
        let b = region(2, 0.0, 0.0005, 120.0, 700.0, Severity::High);
        let m = merge(&a, &b, Terrain::Urban);

        assert_eq!(m.max_radius, 700.0);
        assert_eq!(m.severity, Severity::High);
        assert!((m.spread_rate - 1.5 * 0.5).abs() < 1e-12);
        assert!(m.is_expanding);
        assert_eq!(m.water_level, Severity::High.water_level());
        assert_eq!(m.geometry_points, generate_polygon(m.center, m.radius));
    }

    #[test]
    fn survivor_is_larger_radius() {
        let a = region(1, 0.0, 0.0, 100.0, 500.0, Severity::Low);
        let b = region(2, 0.0, 0.0005, 150.0, 500.0, Severity::Low);
        let m = merge(&a, &b, Terrain::Flat);
        assert_eq!(m.id, 2);
        assert_eq!(m.report_ids, vec!["report-2".to_string(), "report-1".to_string()]);
    }

    #[test]
    fn survivor_tie_goes_to_lower_id() {
        let a = region(7, 0.0, 0.0, 100.0, 500.0, Severity::Low);
        let b = region(3, 0.0, 0.0005, 100.0, 500.0, Severity::Low);
        assert_eq!(merge(&a, &b, Terrain::Flat).id, 3);
        assert_eq!(merge(&b, &a, Terrain::Flat).id, 3);
    }

    #[test]
    fn cap_raised_when_coverage_exceeds_it() {
        let a = region(1, 0.0, 0.0, 100.0, 100.0, Severity::Low);
        let b = region(2, 0.0, 0.0005, 100.0, 100.0, Severity::Low);
        let m = merge(&a, &b, Terrain::Flat);
        assert!(m.radius > 100.0);
        assert!(m.radius <= m.max_radius);
        assert!(!m.is_expanding);
    }

    #[test]
    fn merge_all_leaves_disjoint_regions_alone() {
        let regions = vec![
            region(1, 0.0, 0.0, 100.0, 500.0, Severity::Low),
            region(2, 1.0, 1.0, 100.0, 500.0, Severity::Low),
        ];
        let outcome = merge_all(regions.clone(), Terrain::Flat);
        assert_eq!(outcome.regions, regions);
        assert_eq!(outcome.merge_count(), 0);
    }

    #[test]
    fn merge_all_collapses_chain_into_one() {
        // Each overlaps only its neighbours; the chain is transitively connected.
        let regions: Vec<FloodRegion> = (0..6)
            .map(|i| region(i, 0.0, i as f64 * 0.0015, 100.0, 800.0, Severity::Medium))
            .collect();
        assert!(!overlaps(&regions[0], &regions[2]));

        let outcome = merge_all(regions.clone(), Terrain::Flat);
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.merge_count(), 5);
        for original in &regions {
            assert!(covers(&outcome.regions[0], original));
            assert_eq!(outcome.resolve(original.id), outcome.regions[0].id);
        }
    }

    #[test]
    fn merge_order_does_not_change_the_result_shape() {
        let cluster: Vec<FloodRegion> = vec![
            region(1, 0.0, 0.0, 80.0, 900.0, Severity::Low),
            region(2, 0.0008, 0.0003, 120.0, 900.0, Severity::Medium),
            region(3, -0.0006, 0.001, 60.0, 900.0, Severity::High),
            region(4, 0.0002, -0.0012, 90.0, 900.0, Severity::Low),
            region(5, 0.0015, 0.0015, 70.0, 900.0, Severity::Medium),
        ];
        let far = region(9, 2.0, 2.0, 100.0, 900.0, Severity::Low);

        let orders: [[usize; 5]; 4] = [[0, 1, 2, 3, 4], [4, 3, 2, 1, 0], [2, 0, 4, 1, 3], [1, 4, 0, 3, 2]];
        for order in orders {
            let mut input: Vec<FloodRegion> = order.iter().map(|&i| cluster[i].clone()).collect();
            input.insert(2, far.clone());

            let outcome = merge_all(input, Terrain::Flat);
            assert_eq!(outcome.regions.len(), 2, "order {:?}", order);
            let merged = outcome.regions.iter().find(|r| r.id != 9).unwrap();
            for original in &cluster {
                assert!(covers(merged, original), "order {:?} lost region {}", order, original.id);
            }
            assert_eq!(merged.severity, Severity::High);
            assert!(overlapping_pairs(&outcome.regions).is_empty());
        }
    }

    #[test]
    fn merge_all_output_sorted_by_id() {
        let regions = vec![
            region(5, 3.0, 3.0, 10.0, 50.0, Severity::Low),
            region(2, 1.0, 1.0, 10.0, 50.0, Severity::Low),
            region(9, 2.0, 2.0, 10.0, 50.0, Severity::Low),
        ];
        let ids: Vec<_> = merge_all(regions, Terrain::Flat).regions.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn pairwise_merging_in_any_order_covers_union() {
        let a = region(1, 0.0, 0.0, 100.0, 900.0, Severity::Low);
        let b = region(2, 0.0, 0.0012, 100.0, 900.0, Severity::Low);
        let c = region(3, 0.0009, 0.0006, 100.0, 900.0, Severity::Low);

        let ab_c = merge(&merge(&a, &b, Terrain::Flat), &c, Terrain::Flat);
        let bc_a = merge(&merge(&b, &c, Terrain::Flat), &a, Terrain::Flat);
        let ca_b = merge(&merge(&c, &a, Terrain::Flat), &b, Terrain::Flat);
        for m in [&ab_c, &bc_a, &ca_b] {
            for original in [&a, &b, &c] {
                assert!(covers(m, original));
            }
        }
    }
}
