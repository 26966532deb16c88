pub mod history;
pub mod ids;
pub mod intent;
pub mod official;
pub mod project;
pub mod prospect;
pub mod qualification;
pub mod stage;
pub mod visit;
