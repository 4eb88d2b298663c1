use std::collections::HashSet;
use std::ops::RangeInclusive;

use geo::Coord;
use tracing::{debug, info};

use crate::config::MatchingConfig;
use crate::geometry::distance;
use crate::model::{CandidatePoint, MatchedPair};
use crate::service::VectorOps;

/// 連続する対応点のまとまり
#[derive(Debug, Clone, PartialEq, Eq)]
enum Span {
    Single(usize),
    Cluster(RangeInclusive<usize>),
}

/// 二本の曲線上の候補点を対応付け、近接する対応をまとめて一つに絞る
pub struct CorrespondenceMatcher<'a, S: ?Sized> {
    service: &'a S,
    config: &'a MatchingConfig,
}

impl<'a, S> CorrespondenceMatcher<'a, S>
where
    S: VectorOps + ?Sized,
{
    pub fn new(service: &'a S, config: &'a MatchingConfig) -> Self {
        Self { service, config }
    }

    pub fn match_points(
        &self,
        sources: &[CandidatePoint],
        targets: &[CandidatePoint],
        threshold: f64,
    ) -> Vec<MatchedPair> {
        // 1. 最近傍と距離による絞り込み
        let from: Vec<Coord<f64>> = sources.iter().map(|p| p.position).collect();
        let to: Vec<Coord<f64>> = targets.iter().map(|p| p.position).collect();
        let mut survivors: Vec<MatchedPair> = self
            .service
            .nearest_neighbors(&from, &to)
            .into_iter()
            .zip(sources)
            .filter_map(|(nearest, source)| {
                let (j, d) = nearest?;
                (d < threshold).then_some(MatchedPair {
                    source: *source,
                    target: targets[j],
                    distance: d,
                })
            })
            .collect();
        debug!(
            "{} of {} source points have a match closer than {}",
            survivors.len(),
            sources.len(),
            threshold
        );

        // 2. 曲線 A に沿った順序
        survivors.sort_by(|a, b| {
            a.source
                .part
                .cmp(&b.source.part)
                .then(a.source.offset.total_cmp(&b.source.offset))
                .then(a.source.id.cmp(&b.source.id))
        });

        let link = self.config.cluster_link_factor * threshold;
        let spans = build_spans(&survivors, link, self.config.cluster_break_distance);

        // 3. 使用済みターゲットを除きながら出力
        let mut consumed: HashSet<u32> = HashSet::new();
        let mut pairs = Vec::new();
        for span in spans {
            match span {
                Span::Single(i) => {
                    if consumed.insert(survivors[i].target.id) {
                        pairs.push(survivors[i]);
                    }
                }
                Span::Cluster(range) => {
                    let members = &survivors[range];
                    let best = members
                        .iter()
                        .filter(|p| !consumed.contains(&p.target.id))
                        .min_by(|a, b| {
                            a.distance
                                .total_cmp(&b.distance)
                                .then(a.source.id.cmp(&b.source.id))
                        })
                        .copied();
                    consumed.extend(members.iter().map(|p| p.target.id));
                    if let Some(best) = best {
                        pairs.push(best);
                    }
                }
            }
        }

        info!(
            "Matched {} pairs from {} candidates",
            pairs.len(),
            survivors.len()
        );
        pairs
    }
}

fn build_spans(survivors: &[MatchedPair], link: f64, break_distance: f64) -> Vec<Span> {
    let n = survivors.len();
    let gap = |i: usize| distance(survivors[i].source.position, survivors[i + 1].source.position);

    let mut spans = Vec::new();
    let mut i = 0;
    while i < n {
        if i + 1 == n || gap(i) >= link {
            spans.push(Span::Single(i));
            i += 1;
            continue;
        }
        // 次との間隔が break_distance 以上になった点でクラスタを閉じる
        let mut end = i + 1;
        while end + 1 < n && gap(end) < break_distance {
            end += 1;
        }
        spans.push(Span::Cluster(i..=end));
        i = end + 1;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlanarEngine;

    fn point(id: u32, x: f64, y: f64) -> CandidatePoint {
        CandidatePoint {
            id,
            position: Coord { x, y },
            part: 0,
            offset: x,
        }
    }

    /// A は y=0 上、B は各 A 点の真上 `dy` の位置
    fn fixture(xs: &[f64], dys: &[f64]) -> (Vec<CandidatePoint>, Vec<CandidatePoint>) {
        let sources = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| point(i as u32, x, 0.0))
            .collect();
        let targets = xs
            .iter()
            .zip(dys)
            .enumerate()
            .map(|(i, (&x, &dy))| point(100 + i as u32, x, dy))
            .collect();
        (sources, targets)
    }

    fn matcher_config(break_distance: f64) -> MatchingConfig {
        MatchingConfig {
            cluster_link_factor: 1.5,
            cluster_break_distance: break_distance,
        }
    }

    #[test]
    fn test_far_apart_points_stand_alone() {
        let (a, b) = fixture(&[0.0, 500.0, 1000.0], &[30.0, 20.0, 80.0]);
        let config = matcher_config(200.0);
        let engine = PlanarEngine::new();
        let pairs = CorrespondenceMatcher::new(&engine, &config).match_points(&a, &b, 50.0);

        // 80 は閾値外
        let ids: Vec<(u32, u32)> = pairs.iter().map(|p| (p.source.id, p.target.id)).collect();
        assert_eq!(ids, vec![(0, 100), (1, 101)]);
        assert!(pairs.iter().all(|p| p.distance < 50.0));
    }

    #[test]
    fn test_cluster_keeps_minimum_distance_member() {
        let (a, b) = fixture(&[0.0, 10.0, 20.0], &[30.0, 20.0, 40.0]);
        let config = matcher_config(200.0);
        let engine = PlanarEngine::new();
        let pairs = CorrespondenceMatcher::new(&engine, &config).match_points(&a, &b, 50.0);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].source.id, 1);
        assert_eq!(pairs[0].target.id, 101);
    }

    #[test]
    fn test_break_distance_closes_cluster() {
        let spans = {
            let (a, b) = fixture(&[0.0, 10.0, 30.0, 200.0], &[5.0, 5.0, 5.0, 5.0]);
            let pairs: Vec<MatchedPair> = a
                .iter()
                .zip(&b)
                .map(|(s, t)| MatchedPair {
                    source: *s,
                    target: *t,
                    distance: 5.0,
                })
                .collect();
            build_spans(&pairs, 75.0, 15.0)
        };
        assert_eq!(
            spans,
            vec![Span::Cluster(0..=1), Span::Single(2), Span::Single(3)]
        );
    }

    #[test]
    fn test_cluster_open_at_end_still_emits() {
        let (a, b) = fixture(&[0.0, 500.0, 510.0, 520.0], &[10.0, 25.0, 15.0, 35.0]);
        let config = matcher_config(1_000.0);
        let engine = PlanarEngine::new();
        let pairs = CorrespondenceMatcher::new(&engine, &config).match_points(&a, &b, 50.0);

        let ids: Vec<u32> = pairs.iter().map(|p| p.source.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_targets_are_never_reused() {
        // 二つの A 点が同じ B 点を最近傍に持つ
        let a = vec![point(0, 0.0, 0.0), point(1, 300.0, 0.0)];
        let b = vec![point(7, 150.0, 10.0)];
        let config = matcher_config(200.0);
        let engine = PlanarEngine::new();
        let pairs = CorrespondenceMatcher::new(&engine, &config).match_points(&a, &b, 200.0);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].source.id, 0);

        let mut seen = HashSet::new();
        assert!(pairs.iter().all(|p| seen.insert(p.target.id)));
    }

    #[test]
    fn test_matching_is_idempotent() {
        let xs: Vec<f64> = (0..40).map(|i| i as f64 * 37.0).collect();
        let dys: Vec<f64> = (0..40).map(|i| 10.0 + (i * 7 % 45) as f64).collect();
        let (a, b) = fixture(&xs, &dys);
        let config = matcher_config(200.0);
        let engine = PlanarEngine::new();
        let matcher = CorrespondenceMatcher::new(&engine, &config);

        let first = matcher.match_points(&a, &b, 50.0);
        let second = matcher.match_points(&a, &b, 50.0);
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.iter().all(|p| p.distance < 50.0));
    }
}
