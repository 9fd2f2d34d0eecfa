mod load;
mod types;

pub use load::{data_dir, load_agent_config};
pub use types::{
    AgentConfig, AgentPreset, BackendOverrides, EngineConfig, DEFAULT_SKILL_BUDGET,
    DEFAULT_TIMEOUT_MS, MAX_WORKER_CAP,
};
