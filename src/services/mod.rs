pub mod browser_session;
pub mod challenge_solver;
pub mod form_session;
pub mod image_normalizer;
pub mod notifier;
pub mod result_extractor;
pub mod state_store;
pub mod vision_solver;

pub use browser_session::{BrowserFormSession, BrowserSessionOptions};
pub use challenge_solver::{solve_with_self_heal, ChallengeSolver};
pub use form_session::{Challenge, FormSession, ResponseDocument};
pub use notifier::{NotificationMessage, Notifier, ResendNotifier};
pub use result_extractor::{ResultExtractor, ResultFieldIds};
pub use state_store::{changed_against, JsonFileStateStore, StateStore};
pub use vision_solver::VisionSolver;
