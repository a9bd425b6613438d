//! CLI Commands

pub mod config;
pub mod destinations;
pub mod navigate;
pub mod probe;
pub mod ui;

use miqnav::UiKind;

/// `--ssui` picks the self-service UI, otherwise the admin UI
pub fn ui_kind(ssui: bool) -> UiKind {
    if ssui {
        UiKind::SelfService
    } else {
        UiKind::Admin
    }
}
