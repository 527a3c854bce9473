pub mod update_previous_pipes;

pub use update_previous_pipes::{Transfer, UpdatePreviousPipesStage};
