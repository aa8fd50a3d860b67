use std::ops::{Deref, DerefMut};
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::distance::DistanceTable;
use crate::error::{Error, Result};

/// Useful valves already opened on the current path, one bit per index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenedValves(u64);

impl OpenedValves {
    pub fn contains(&self, valve: usize) -> bool {
        self.0 & (1u64 << valve) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Marks `valve` opened until the returned guard is dropped.
    pub fn enter(&mut self, valve: usize) -> Opened<'_> {
        let fresh = !self.contains(valve);
        self.0 |= 1u64 << valve;

        Opened {
            valves: self,
            valve,
            fresh,
        }
    }
}

pub struct Opened<'a> {
    valves: &'a mut OpenedValves,
    valve: usize,
    // Entering an already opened valve must not close it on the way out.
    fresh: bool,
}

impl Deref for Opened<'_> {
    type Target = OpenedValves;

    fn deref(&self) -> &OpenedValves {
        self.valves
    }
}

impl DerefMut for Opened<'_> {
    fn deref_mut(&mut self) -> &mut OpenedValves {
        self.valves
    }
}

impl Drop for Opened<'_> {
    fn drop(&mut self) {
        if self.fresh {
            self.valves.0 &= !(1u64 << self.valve);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agent {
    pub valve: usize,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct Step<const N: usize> {
    agents: [Agent; N],
    opens: Option<usize>,
    released: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tracker {
    best: u64,
    states: u64,
    deepest: usize,
}

impl Tracker {
    fn observe(&mut self, released: u64, opened: OpenedValves) {
        self.states += 1;
        self.best = self.best.max(released);
        self.deepest = self.deepest.max(opened.len());
    }

    fn merge(self, other: Tracker) -> Tracker {
        Tracker {
            best: self.best.max(other.best),
            states: self.states + other.states,
            deepest: self.deepest.max(other.deepest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub released: u64,
    pub states: u64,
    pub deepest: usize,
}

/// Backtracking search for the most pressure `N` agents can release together.
///
/// The agent with the most time left moves next, ties going to the lowest
/// index. It either walks to an unopened valve and opens it, or stands down
/// for good so the others carry on without it. A useful start valve is just
/// another target at distance 0, so the search may also leave it shut.
pub struct Search<'a, const N: usize> {
    table: &'a DistanceTable,
}

pub type SingleAgentSearch<'a> = Search<'a, 1>;
pub type DualAgentSearch<'a> = Search<'a, 2>;

impl<'a, const N: usize> Search<'a, N> {
    pub fn new(table: &'a DistanceTable) -> Search<'a, N> {
        Search { table }
    }

    /// Every agent starts at the start valve with `minutes` on its clock.
    ///
    /// Fails if the pressure all valves could release in `minutes` doesn't
    /// fit in a `u64`; below that limit no sum in the search can overflow.
    pub fn run(&self, minutes: u32) -> Result<Outcome> {
        if self.table.release_ceiling(minutes).is_none() {
            return Err(Error::PressureOverflow { minutes });
        }

        let started = Instant::now();

        let agents = [Agent {
            valve: self.table.start(),
            remaining: minutes,
        }; N];
        let opened = OpenedValves::default();

        let mut root = Tracker::default();
        root.observe(0, opened);

        // Each first move gets its own copy of the opened set.
        let tracker = self
            .steps(agents, opened)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|step| {
                let mut opened = opened;
                let mut tracker = Tracker::default();

                let found = match step.opens {
                    Some(valve) => {
                        let mut opened = opened.enter(valve);
                        self.explore(&mut opened, &mut tracker, step.agents, step.released)
                    }
                    None => self.explore(&mut opened, &mut tracker, step.agents, step.released),
                };

                tracker.best = tracker.best.max(found);
                tracker
            })
            .reduce(Tracker::default, Tracker::merge)
            .merge(root);

        debug!(
            agents = N,
            minutes,
            states = tracker.states,
            released = tracker.best,
            elapsed = ?started.elapsed(),
            "search finished"
        );

        Ok(Outcome {
            released: tracker.best,
            states: tracker.states,
            deepest: tracker.deepest,
        })
    }

    fn explore(
        &self,
        opened: &mut OpenedValves,
        tracker: &mut Tracker,
        agents: [Agent; N],
        released: u64,
    ) -> u64 {
        tracker.observe(released, *opened);

        if released + self.optimistic_gain(&agents, *opened) <= tracker.best {
            return released;
        }

        let mut best = released;
        for step in self.steps(agents, *opened) {
            let found = match step.opens {
                Some(valve) => {
                    let mut opened = opened.enter(valve);
                    self.explore(&mut opened, tracker, step.agents, released + step.released)
                }
                None => self.explore(opened, tracker, step.agents, released + step.released),
            };

            best = best.max(found);
        }

        best
    }

    fn steps(
        &self,
        agents: [Agent; N],
        opened: OpenedValves,
    ) -> impl Iterator<Item = Step<N>> + '_ {
        let active = active_agent(&agents);
        let Agent { valve, remaining } = agents[active];

        let moves = (0..self.table.useful_count())
            .filter(move |&target| !opened.contains(target))
            .filter_map(move |target| {
                let left = self.table.open_within(valve, target, remaining)?;

                let mut agents = agents;
                agents[active] = Agent {
                    valve: target,
                    remaining: left,
                };

                Some(Step {
                    agents,
                    opens: Some(target),
                    released: self.table.flow_rate(target) * u64::from(left),
                })
            });

        let others_busy = agents
            .iter()
            .enumerate()
            .any(|(i, agent)| i != active && agent.remaining > 0);

        let stand_down = others_busy.then(|| {
            let mut agents = agents;
            agents[active].remaining = 0;

            Step {
                agents,
                opens: None,
                released: 0,
            }
        });

        moves.chain(stand_down)
    }

    // Pretends every unopened valve gets opened by whichever agent could
    // reach it soonest.
    fn optimistic_gain(&self, agents: &[Agent; N], opened: OpenedValves) -> u64 {
        (0..self.table.useful_count())
            .filter(|&valve| !opened.contains(valve))
            .map(|valve| {
                agents
                    .iter()
                    .filter_map(|agent| self.table.open_within(agent.valve, valve, agent.remaining))
                    .max()
                    .map_or(0, |left| u64::from(left) * self.table.flow_rate(valve))
            })
            .sum()
    }
}

fn active_agent(agents: &[Agent]) -> usize {
    agents
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|(_i, agent)| agent.remaining)
        .map_or(0, |(i, _agent)| i)
}

/// Most pressure one agent can release in `minutes`.
pub fn max_pressure(table: &DistanceTable, minutes: u32) -> Result<u64> {
    Ok(SingleAgentSearch::new(table).run(minutes)?.released)
}

/// Most pressure two agents can release with `minutes` each.
pub fn max_pressure_with_helper(table: &DistanceTable, minutes: u32) -> Result<u64> {
    Ok(DualAgentSearch::new(table).run(minutes)?.released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::EXAMPLE;
    use crate::graph::ValveGraph;

    fn table(input: &str) -> DistanceTable {
        let graph = ValveGraph::parse(input).unwrap();
        DistanceTable::build(&graph, "AA").unwrap()
    }

    #[test]
    fn test_opened_guard() {
        let mut opened = OpenedValves::default();

        {
            let mut outer = opened.enter(3);
            assert!(outer.contains(3));

            {
                let inner = outer.enter(3);
                assert_eq!(inner.len(), 1);
            }
            assert!(outer.contains(3));

            {
                let inner = outer.enter(63);
                assert!(inner.contains(63));
                assert_eq!(inner.len(), 2);
            }
            assert!(!outer.contains(63));
        }

        assert!(opened.is_empty());
    }

    #[test]
    fn test_active_agent() {
        let agent = |remaining| Agent { valve: 0, remaining };

        assert_eq!(active_agent(&[agent(3)]), 0);
        assert_eq!(active_agent(&[agent(3), agent(5)]), 1);
        assert_eq!(active_agent(&[agent(5), agent(3)]), 0);
        assert_eq!(active_agent(&[agent(4), agent(4)]), 0);
    }

    #[test]
    fn test_example_alone() {
        let table = table(EXAMPLE);
        assert_eq!(max_pressure(&table, 30).unwrap(), 1651);
    }

    #[test]
    fn test_example_with_helper() {
        let table = table(EXAMPLE);
        assert_eq!(max_pressure_with_helper(&table, 26).unwrap(), 1707);
    }

    #[test]
    fn test_deterministic() {
        let table = table(EXAMPLE);

        let alone = SingleAgentSearch::new(&table);
        assert_eq!(alone.run(30).unwrap(), alone.run(30).unwrap());

        let together = DualAgentSearch::new(&table);
        assert_eq!(
            together.run(26).unwrap().released,
            together.run(26).unwrap().released
        );
    }

    #[test]
    fn test_single_valve() {
        // BB is 3 minutes from AA.
        let input = "Valve AA has flow rate=0; tunnel leads to valve XA\n\
                     Valve XA has flow rate=0; tunnels lead to valves AA, XB\n\
                     Valve XB has flow rate=0; tunnels lead to valves XA, BB\n\
                     Valve BB has flow rate=9; tunnel leads to valve XB";

        let table = table(input);
        for minutes in 0..=12u32 {
            let expected = 9 * u64::from(minutes.saturating_sub(3 + 1));
            assert_eq!(
                max_pressure(&table, minutes).unwrap(),
                expected,
                "{} minutes",
                minutes
            );
            assert_eq!(
                max_pressure_with_helper(&table, minutes).unwrap(),
                expected,
                "{} minutes",
                minutes
            );
        }
    }

    #[test]
    fn test_useful_start() {
        let input = "Valve AA has flow rate=10; tunnel leads to valve BB\n\
                     Valve BB has flow rate=1; tunnel leads to valve AA";

        // Opening AA is optional: with 5 minutes it pays to open it first
        // (40) and then BB (2).
        let table = table(input);
        assert_eq!(max_pressure(&table, 1).unwrap(), 0);
        assert_eq!(max_pressure(&table, 2).unwrap(), 10);
        assert_eq!(max_pressure(&table, 5).unwrap(), 42);
    }

    #[test]
    fn test_unreachable_valve_is_skipped() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\n\
                     Valve BB has flow rate=5; tunnel leads to valve AA\n\
                     Valve CC has flow rate=100; tunnel leads to valve CC";

        let table = table(input);
        assert_eq!(max_pressure(&table, 10).unwrap(), 40);
        assert_eq!(max_pressure_with_helper(&table, 10).unwrap(), 40);
    }

    #[test]
    fn test_helper_takes_the_other_branch() {
        let input = "Valve AA has flow rate=0; tunnels lead to valves BB, CC\n\
                     Valve BB has flow rate=10; tunnel leads to valve AA\n\
                     Valve CC has flow rate=10; tunnel leads to valve AA";

        let table = table(input);
        assert_eq!(max_pressure(&table, 4).unwrap(), 20);
        assert_eq!(max_pressure_with_helper(&table, 4).unwrap(), 40);
    }

    #[test]
    fn test_monotonic() {
        let table = table(EXAMPLE);

        let alone: Vec<_> = (0..=30)
            .map(|minutes| max_pressure(&table, minutes).unwrap())
            .collect();
        assert!(alone.windows(2).all(|w| w[0] <= w[1]), "{:?}", alone);

        let together: Vec<_> = (0..=26)
            .map(|minutes| max_pressure_with_helper(&table, minutes).unwrap())
            .collect();
        assert!(together.windows(2).all(|w| w[0] <= w[1]), "{:?}", together);
    }

    #[test]
    fn test_helper_never_hurts() {
        let table = table(EXAMPLE);

        for minutes in [5, 10, 15, 20, 26] {
            let alone = max_pressure(&table, minutes).unwrap();
            assert!(max_pressure_with_helper(&table, minutes).unwrap() >= alone);
        }
    }

    #[test]
    fn test_large_flow_rate() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\n\
                     Valve BB has flow rate=200000000; tunnel leads to valve AA";

        let table = table(input);
        assert_eq!(max_pressure(&table, 30).unwrap(), 5_600_000_000);
        assert_eq!(max_pressure_with_helper(&table, 30).unwrap(), 5_600_000_000);
    }

    #[test]
    fn test_long_budget() {
        let table = table(EXAMPLE);
        let minutes = 1_000_000_000;

        let released = max_pressure(&table, minutes).unwrap();
        assert!(released > u64::from(u32::MAX));
        assert!(released <= table.release_ceiling(minutes).unwrap());
    }

    #[test]
    fn test_pressure_overflow() {
        let input = "Valve AA has flow rate=0; tunnel leads to valve BB\n\
                     Valve BB has flow rate=1000000000000000000; tunnel leads to valve AA";

        let table = table(input);
        assert_eq!(max_pressure(&table, 18).unwrap(), 16_000_000_000_000_000_000);
        assert!(matches!(
            max_pressure(&table, 30),
            Err(Error::PressureOverflow { minutes: 30 })
        ));
        assert!(matches!(
            max_pressure_with_helper(&table, 30),
            Err(Error::PressureOverflow { minutes: 30 })
        ));
    }

    #[test]
    fn test_opened_set_is_restored() {
        let table = table(EXAMPLE);
        let start = table.start();

        let alone = SingleAgentSearch::new(&table);
        let mut opened = OpenedValves::default();
        let mut tracker = Tracker::default();
        let agents = [Agent {
            valve: start,
            remaining: 30,
        }];
        let found = alone.explore(&mut opened, &mut tracker, agents, 0);
        assert!(opened.is_empty());
        assert_eq!(found.max(tracker.best), 1651);

        let together = DualAgentSearch::new(&table);
        let mut opened = OpenedValves::default();
        let mut tracker = Tracker::default();
        let agents = [Agent {
            valve: start,
            remaining: 26,
        }; 2];
        let found = together.explore(&mut opened, &mut tracker, agents, 0);
        assert!(opened.is_empty());
        assert_eq!(found.max(tracker.best), 1707);
    }

    #[test]
    fn test_deepest_path_is_bounded() {
        let table = table(EXAMPLE);

        let outcome = SingleAgentSearch::new(&table).run(30).unwrap();
        assert!(outcome.deepest <= table.useful_count());
        assert!(outcome.states > 0);

        // Two agents with plenty of time open everything.
        let outcome = DualAgentSearch::new(&table).run(60).unwrap();
        assert_eq!(outcome.deepest, table.useful_count());
    }

    #[test]
    fn test_stand_down_lets_the_other_agent_move() {
        // TT is 8 minutes from XX but only 1 from YY.
        let input = "Valve XX has flow rate=1; tunnel leads to valve PA\n\
                     Valve TT has flow rate=10; tunnels lead to valves PG, YY\n\
                     Valve YY has flow rate=1; tunnel leads to valve TT\n\
                     Valve PA has flow rate=0; tunnels lead to valves XX, PB\n\
                     Valve PB has flow rate=0; tunnels lead to valves PA, PC\n\
                     Valve PC has flow rate=0; tunnels lead to valves PB, PD\n\
                     Valve PD has flow rate=0; tunnels lead to valves PC, PE\n\
                     Valve PE has flow rate=0; tunnels lead to valves PD, PF\n\
                     Valve PF has flow rate=0; tunnels lead to valves PE, PG\n\
                     Valve PG has flow rate=0; tunnels lead to valves PF, TT";

        let graph = ValveGraph::parse(input).unwrap();
        let table = DistanceTable::build(&graph, "XX").unwrap();
        let (xx, tt, yy) = (0, 1, 2);
        assert_eq!(table.distance(xx, tt), Some(8));
        assert_eq!(table.distance(yy, tt), Some(1));

        let mut opened = OpenedValves::default();
        let mut opened = opened.enter(xx);
        let mut opened = opened.enter(yy);

        let agents = [
            Agent {
                valve: xx,
                remaining: 10,
            },
            Agent {
                valve: yy,
                remaining: 9,
            },
        ];

        let mut tracker = Tracker::default();
        let found = DualAgentSearch::new(&table).explore(&mut opened, &mut tracker, agents, 0);
        assert_eq!(found.max(tracker.best), 70);
        assert_eq!(opened.len(), 2);
    }
}
