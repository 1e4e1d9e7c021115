pub mod alerts;
pub mod poll;
pub mod portfolio;
pub mod setup;
pub mod ui;
