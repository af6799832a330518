pub mod actr;
pub mod coldstart;
pub mod ensemble;
pub mod heuristic;
pub mod linucb;
pub mod mapper;
pub mod matrix;
pub mod thompson;

pub use actr::ActrModel;
pub use coldstart::ColdStartManager;
pub use ensemble::EnsembleDecision;
pub use heuristic::HeuristicLearner;
pub use linucb::LinUcbModel;
pub use mapper::DecisionMapper;
pub use thompson::ThompsonSamplingModel;
