// Sounding Rocket Program
//
// The seven operational phases of the flight controller.

/// The current coarse-grained operational mode of the flight controller.
///
/// Exactly one phase is active at a time. Legal transitions are enumerated in
/// [`crate::phase_controller::PhaseController`]; any (from, to) pair observed
/// at runtime must appear in that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SystemsCheck,
    Error,
    Idle,
    Armed,
    Launched,
    Deployed,
    Landed,
}

impl Phase {
    /// All phases, in the order they are first reachable from boot.
    pub const ALL: [Phase; 7] = [
        Phase::SystemsCheck,
        Phase::Error,
        Phase::Idle,
        Phase::Armed,
        Phase::Launched,
        Phase::Deployed,
        Phase::Landed,
    ];

    /// The key used to look this phase up in `config.json`'s `state_intervals` map.
    pub fn config_key(self) -> &'static str {
        match self {
            Phase::SystemsCheck => "SYSTEMS_CHECK",
            Phase::Error => "ERROR",
            Phase::Idle => "IDLE",
            Phase::Armed => "ARMED",
            Phase::Launched => "LAUNCHED",
            Phase::Deployed => "DEPLOYED",
            Phase::Landed => "LANDED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_key_is_unique_per_phase() {
        let mut keys: Vec<&str> = Phase::ALL.iter().map(|p| p.config_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), Phase::ALL.len());
    }
}
