//! Directory and file names shared by the runner and the containers it starts.
//!
//! Every directory is created inside the job working directory and mounted at
//! `/<name>` in every service of the compose project.

pub const CHALLENGE_SOLUTION_OUTPUT_DIR: &str = "challenge-solution-output";
pub const CHALLENGE_RESULTS_DIR: &str = "challenge-results";
pub const CHALLENGE_DESCRIPTION_DIR: &str = "challenge-description";
pub const CHALLENGE_EVALUATION_OUTPUT_DIR: &str = "challenge-evaluation-output";
pub const CHALLENGE_PREVIOUS_STEPS_DIR: &str = "previous-steps";

pub const CHALLENGE_RESULTS_YAML: &str = "challenge-results/challenge_results.yaml";
pub const CHALLENGE_DESCRIPTION_YAML: &str = "challenge-description/description.yaml";
pub const CHALLENGE_SOLUTION_OUTPUT_YAML: &str = "challenge-solution-output/output-solution.yaml";

pub const ENV_CHALLENGE_NAME: &str = "challenge_name";
pub const ENV_CHALLENGE_STEP_NAME: &str = "challenge_step_name";

/// Image placeholder replaced by the submission's image.
pub const SUBMISSION_CONTAINER_TAG: &str = "SUBMISSION_CONTAINER";

pub const COMPOSE_FILE_NAME: &str = "docker-compose.yaml";
pub const EVALUATION_NETWORK: &str = "evaluation";

/// All shared directories, in mount order.
pub const SHARED_DIRS: [&str; 5] = [
    CHALLENGE_SOLUTION_OUTPUT_DIR,
    CHALLENGE_RESULTS_DIR,
    CHALLENGE_DESCRIPTION_DIR,
    CHALLENGE_EVALUATION_OUTPUT_DIR,
    CHALLENGE_PREVIOUS_STEPS_DIR,
];
