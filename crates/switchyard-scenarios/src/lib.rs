pub mod replay;
pub mod spec;

pub use replay::ReplayEnvironment;
pub use spec::{
    load_scenario_from_path, parse_start_time, tick_time, validate, InitialBuses, ScenarioFile,
    TickSpec,
};
