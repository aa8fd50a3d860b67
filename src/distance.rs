use itertools::Itertools;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{ValveGraph, ValveNode};

const UNREACHABLE: u32 = u32::MAX;

/// The most useful valves a table can hold, one bit each in `OpenedValves`.
pub const MAX_USEFUL: usize = 64;

/// Shortest walking times between the start valve and every useful valve.
///
/// Useful valves take the indices `0..useful_count()` in input order. The
/// start valve shares its index with a useful valve when it has a flow rate,
/// otherwise it sits at `useful_count()`.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    names: Vec<String>,
    flow_rates: Vec<u64>,
    total_flow: Option<u64>,
    distances: Vec<u32>,
    useful: usize,
    start: usize,
}

impl DistanceTable {
    pub fn build(graph: &ValveGraph, start: &str) -> Result<DistanceTable> {
        let start_node = graph
            .find(start)
            .ok_or_else(|| Error::UnknownStart(start.to_owned()))?;

        let mut nodes: Vec<&ValveNode> = graph.useful().collect();
        let useful = nodes.len();
        if useful > MAX_USEFUL {
            return Err(Error::TooManyValves(useful));
        }

        let start = match nodes.iter().position(|node| node.id == start_node.id) {
            Some(i) => i,
            None => {
                nodes.push(start_node);
                useful
            }
        };

        let len = nodes.len();
        let mut distances = vec![UNREACHABLE; len * len];

        for (i, node) in nodes.iter().enumerate() {
            let costs = graph.walk(node.id);
            for (j, other) in nodes.iter().enumerate() {
                if let Some(&cost) = costs.get(&other.id) {
                    distances[i * len + j] = cost;
                }
            }
        }

        debug!(
            valves = graph.len(),
            useful,
            unreachable = distances.iter().filter(|&&d| d == UNREACHABLE).count(),
            "built distance table"
        );

        let flow_rates: Vec<u64> = nodes.iter().map(|node| node.valve.flow_rate).collect();
        let total_flow = flow_rates
            .iter()
            .try_fold(0u64, |total, &flow| total.checked_add(flow));

        Ok(DistanceTable {
            names: nodes.iter().map(|node| node.valve.name.clone()).collect(),
            flow_rates,
            total_flow,
            distances,
            useful,
            start,
        })
    }

    /// Number of indexed valves, including a zero-flow start valve.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn useful_count(&self) -> usize {
        self.useful
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn name(&self, valve: usize) -> &str {
        &self.names[valve]
    }

    pub fn flow_rate(&self, valve: usize) -> u64 {
        self.flow_rates[valve]
    }

    /// Upper limit on the pressure all valves together release in `minutes`,
    /// or `None` if it doesn't fit in a `u64`.
    pub fn release_ceiling(&self, minutes: u32) -> Option<u64> {
        self.total_flow?.checked_mul(u64::from(minutes))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// `None` when no tunnels connect the two valves.
    pub fn distance(&self, from: usize, to: usize) -> Option<u32> {
        Some(self.raw_distance(from, to)).filter(|&d| d != UNREACHABLE)
    }

    /// Minutes left after walking from `from` to `to` and opening it, if that
    /// leaves the valve at least one minute to release pressure.
    pub(crate) fn open_within(&self, from: usize, to: usize, remaining: u32) -> Option<u32> {
        let d = self.raw_distance(from, to);
        if d == UNREACHABLE || d + 1 >= remaining {
            None
        } else {
            Some(remaining - d - 1)
        }
    }

    fn raw_distance(&self, from: usize, to: usize) -> u32 {
        let len = self.len();
        assert!(
            from < len && to < len,
            "valve index out of range: {} -> {} in a table of {}",
            from,
            to,
            len
        );
        self.distances[from * len + to]
    }

    /// All `(from, to)` index pairs of the table.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        (0..self.len()).cartesian_product(0..self.len())
    }
}
