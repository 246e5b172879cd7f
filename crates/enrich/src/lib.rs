pub mod go_mapping;
pub mod integrator;
pub mod linking;
pub mod pathology;
pub mod processes;
pub mod retry;
pub mod runner;
pub mod stages;
pub mod tally;
pub mod trials;

pub use go_mapping::map_go_terms;
pub use integrator::{IntegrationError, IntegrationReport, ResponseIntegrator};
pub use linking::link_processes;
pub use pathology::{PathologyReport, link_pathology};
pub use processes::{LoadReport, load_processes};
pub use retry::RetryPolicy;
pub use runner::{BatchRunner, ItemOutcome, RunReport};
pub use stages::{
    generate_prompts, integrate_responses, iteration_dir, pipeline_properties, run_inference,
    run_inference_iterations,
};
pub use tally::{FailureReason, RunTally, TallySnapshot};
pub use trials::{download_trials, fetch_all_studies};
