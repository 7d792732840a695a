pub mod cpu;
pub mod load_average;
pub mod memory;
pub mod process;

use log::info;

pub use cpu::CpuProbe;
pub use load_average::LoadAverageProbe;
pub use memory::MemoryProbe;
pub use process::ProcessProbe;

use crate::probes::{Probe, ProbeRegistry};
use crate::settings::BuiltinProbes;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const LOAD_AVERAGE: &str = "load_average";
pub const PROCESS: &str = "process";

/// Registers the builtin probes enabled in `settings`. Returns the names
/// that were registered.
pub fn register_enabled(registry: &ProbeRegistry, settings: &BuiltinProbes) -> Vec<&'static str> {
    let candidates = [
        (CPU, settings.cpu_enabled(), Probe::stateful(CpuProbe)),
        (MEMORY, settings.memory_enabled(), Probe::stateless(MemoryProbe)),
        (
            LOAD_AVERAGE,
            settings.load_average_enabled(),
            Probe::stateless(LoadAverageProbe),
        ),
        (PROCESS, settings.process_enabled(), Probe::stateless(ProcessProbe)),
    ];

    let mut registered = Vec::new();
    for (name, enabled, probe) in candidates {
        if enabled {
            registry.register(name, probe);
            registered.push(name);
        }
    }

    info!("Builtin probes registered: {:?}", registered);
    registered
}
