//! Deterministic unique processor names.

use std::collections::HashMap;

/// Generates globally unique, deterministic node names within one builder.
///
/// Each human-readable prefix gets its own strictly increasing counter, so
/// `KSTREAM-FILTER-0000000000` and `KSTREAM-FILTER-0000000001` never collide
/// no matter how many filters a topology registers. Scoped per builder:
/// independent topologies in one process restart their counters.
#[derive(Debug, Default)]
pub struct NodeNamer {
    counters: HashMap<String, u32>,
}

impl NodeNamer {
    /// Namer with all counters at zero.
    pub fn new() -> Self {
        NodeNamer {
            counters: HashMap::new(),
        }
    }

    /// Next unique name for the given prefix.
    pub fn new_name(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{}-{:010}", prefix, counter);
        *counter += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_strictly_increasing_per_prefix() {
        let mut namer = NodeNamer::new();
        assert_eq!(namer.new_name("KSTREAM-FILTER"), "KSTREAM-FILTER-0000000000");
        assert_eq!(namer.new_name("KSTREAM-FILTER"), "KSTREAM-FILTER-0000000001");
        assert_eq!(namer.new_name("KSTREAM-MAP"), "KSTREAM-MAP-0000000000");
        assert_eq!(namer.new_name("KSTREAM-FILTER"), "KSTREAM-FILTER-0000000002");
    }
}
