pub mod refresh;

pub use refresh::RefreshCoordinator;
