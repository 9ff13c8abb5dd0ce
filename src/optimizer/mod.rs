//! Hyperparameter search
//!
//! - [`SearchSpace`] describes the integer ranges and categorical choices
//! - [`HyperparameterSearch`] runs randomized or grid search, scoring each
//!   candidate with stratified cross-validation

mod search;
mod search_space;

pub use search::{forest_params, HyperparameterSearch, SearchResult, SearchStrategy, TrialResult};
pub use search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
