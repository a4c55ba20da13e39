//! Terminal UI: Elm-architecture event loop over the document browser,
//! chat, and upload views.

pub mod app;
pub mod events;
pub mod theme;
pub mod views;
pub mod widgets;
