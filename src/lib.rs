pub mod client;
pub mod editor;
pub mod face;
pub mod payload;
pub mod regions;
pub mod selectors;
pub mod template;
pub mod types;
pub mod view;
