use std::collections::{HashMap, HashSet};

use id_arena::{Arena, Id};

use crate::error::{Error, Result};
use crate::parser::{parse_valves, ValveSpec};

#[derive(Debug, PartialEq, Clone)]
pub struct Valve {
    pub name: String,
    pub flow_rate: u64,
}

impl Valve {
    pub fn is_useful(&self) -> bool {
        self.flow_rate > 0
    }
}

#[derive(Debug)]
pub struct ValveNode {
    pub id: Id<ValveNode>,
    pub valve: Valve,
    pub tunnels: Vec<Id<ValveNode>>,
}

/// Valves and their one-minute tunnels. Every tunnel can be walked both ways,
/// whether or not both ends list it.
#[derive(Debug)]
pub struct ValveGraph {
    arena: Arena<ValveNode>,
    ids: HashMap<String, Id<ValveNode>>,
}

impl ValveGraph {
    pub fn parse(input: &str) -> Result<ValveGraph> {
        ValveGraph::build(parse_valves(input)?)
    }

    pub fn build(specs: Vec<ValveSpec>) -> Result<ValveGraph> {
        specs
            .into_iter()
            .try_fold(ValveGraphBuilder::default(), ValveGraphBuilder::accumulate)?
            .finish()
    }

    pub fn get(&self, id: Id<ValveNode>) -> &ValveNode {
        self.arena.get(id).expect("valid id")
    }

    pub fn find(&self, name: &str) -> Option<&ValveNode> {
        self.ids.get(name).map(|&id| self.get(id))
    }

    /// Valves in input order.
    pub fn valves(&self) -> impl Iterator<Item = &ValveNode> + '_ {
        self.arena.iter().map(|(_id, node)| node)
    }

    pub fn useful(&self) -> impl Iterator<Item = &ValveNode> + '_ {
        self.valves().filter(|node| node.valve.is_useful())
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    /// Minutes needed to walk from `start` to every valve it can reach.
    pub fn walk(&self, start: Id<ValveNode>) -> HashMap<Id<ValveNode>, u32> {
        let mut costs = HashMap::from([(start, 0)]);
        let mut current = HashSet::from([start]);

        for cost in 1.. {
            current = current
                .into_iter()
                .flat_map(|id| self.get(id).tunnels.iter().copied())
                .filter(|id| !costs.contains_key(id))
                .collect();

            if current.is_empty() {
                break;
            }

            costs.extend(current.iter().map(|&id| (id, cost)));
        }

        costs
    }
}

#[derive(Default)]
struct ValveGraphBuilder {
    arena: Arena<ValveNode>,
    tunnels: Vec<(Id<ValveNode>, Vec<String>)>,
    ids: HashMap<String, Id<ValveNode>>,
}

impl ValveGraphBuilder {
    fn accumulate(mut self, spec: ValveSpec) -> Result<ValveGraphBuilder> {
        let ValveSpec {
            name,
            flow_rate,
            tunnels,
        } = spec;

        if self.ids.contains_key(&name) {
            return Err(Error::DuplicateValve(name));
        }

        let valve = Valve {
            name: name.clone(),
            flow_rate,
        };
        let id = self.arena.alloc_with_id(|id| ValveNode {
            id,
            valve,
            tunnels: Default::default(),
        });

        self.ids.insert(name, id);
        self.tunnels.push((id, tunnels));

        Ok(self)
    }

    fn finish(self) -> Result<ValveGraph> {
        let ValveGraphBuilder {
            mut arena,
            tunnels,
            ids,
        } = self;

        for (id, targets) in tunnels {
            for target in targets {
                let Some(&target_id) = ids.get(&target) else {
                    let valve = arena.get(id).expect("valid id").valve.name.clone();
                    return Err(Error::UnknownTunnel { valve, target });
                };

                connect(&mut arena, id, target_id);
                connect(&mut arena, target_id, id);
            }
        }

        Ok(ValveGraph { arena, ids })
    }
}

fn connect(arena: &mut Arena<ValveNode>, from: Id<ValveNode>, to: Id<ValveNode>) {
    let node = arena.get_mut(from).expect("valid id");
    if !node.tunnels.contains(&to) {
        node.tunnels.push(to);
    }
}
