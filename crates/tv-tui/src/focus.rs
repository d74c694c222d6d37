//! Focus handling inside the EPG and rewind overlays.
//!
//! Overlays only read the channel list and answer keys with an
//! [`OverlayCommand`]; the controller applies every command.

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;
use tv_proto::protocol::Channel;

use crate::action::{OverlayCommand, RemoteKey};
use crate::picker::{PickerColumn, TimePicker};

// ── EPG ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpgFocus {
    CategoryBar,
    ChannelList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    All,
    Favorites,
    Named(String),
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::All => "All",
            Category::Favorites => "Favorites",
            Category::Named(name) => name,
        }
    }

    fn matches(&self, channel: &Channel) -> bool {
        match self {
            Category::All => true,
            Category::Favorites => channel.favorite,
            Category::Named(name) => channel.category == *name,
        }
    }
}

/// `All`, `Favorites`, then each distinct category in first-seen order.
pub fn build_categories(channels: &[Channel]) -> Vec<Category> {
    let mut categories = vec![Category::All, Category::Favorites];
    for channel in channels {
        if channel.category.is_empty() {
            continue;
        }
        let named = Category::Named(channel.category.clone());
        if !categories.contains(&named) {
            categories.push(named);
        }
    }
    categories
}

/// Channel guide overlay.
///
/// `selected` indexes `filtered` and is `None` exactly when `filtered` is
/// empty, so it can never point past the visible list.
#[derive(Debug, Clone)]
pub struct EpgOverlay {
    categories: Vec<Category>,
    category_index: usize,
    filtered: Vec<usize>,
    selected: Option<usize>,
    focus: EpgFocus,
}

impl EpgOverlay {
    /// Opens on `All` with the playing channel highlighted.
    pub fn open(channels: &[Channel], current_index: usize) -> Self {
        let mut overlay = Self {
            categories: build_categories(channels),
            category_index: 0,
            filtered: Vec::new(),
            selected: None,
            focus: EpgFocus::ChannelList,
        };
        overlay.apply_filter(channels);
        overlay.selected = match overlay.filtered.iter().position(|&i| i == current_index) {
            Some(pos) => Some(pos),
            None if overlay.filtered.is_empty() => None,
            None => Some(0),
        };
        if overlay.selected.is_none() {
            overlay.focus = EpgFocus::CategoryBar;
        }
        overlay
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_index(&self) -> usize {
        self.category_index
    }

    pub fn current_category(&self) -> &Category {
        &self.categories[self.category_index]
    }

    /// Indices into the full channel list, in display order.
    pub fn filtered(&self) -> &[usize] {
        &self.filtered
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn focus(&self) -> EpgFocus {
        self.focus
    }

    /// Full-list index of the highlighted row.
    pub fn selected_channel(&self) -> Option<usize> {
        self.selected.and_then(|i| self.filtered.get(i).copied())
    }

    /// Switch category: filter and reset the selection to the first row.
    pub fn select_category(&mut self, index: usize, channels: &[Channel]) {
        if index >= self.categories.len() {
            return;
        }
        self.category_index = index;
        self.apply_filter(channels);
        self.selected = if self.filtered.is_empty() { None } else { Some(0) };
    }

    /// Re-apply the current filter after channel data changed (e.g. a
    /// favourite flipped), keeping the highlighted channel when it is still
    /// visible and clamping otherwise.
    pub fn refresh(&mut self, channels: &[Channel]) {
        let previous = self.selected_channel();
        let previous_pos = self.selected.unwrap_or(0);
        self.categories = build_categories(channels);
        if self.category_index >= self.categories.len() {
            self.category_index = 0;
        }
        self.apply_filter(channels);
        self.selected = match previous.and_then(|ch| self.filtered.iter().position(|&i| i == ch)) {
            Some(pos) => Some(pos),
            None if self.filtered.is_empty() => None,
            None => Some(previous_pos.min(self.filtered.len() - 1)),
        };
        if self.selected.is_none() {
            self.focus = EpgFocus::CategoryBar;
        }
    }

    fn apply_filter(&mut self, channels: &[Channel]) {
        let category = &self.categories[self.category_index];
        self.filtered = channels
            .iter()
            .enumerate()
            .filter(|(_, c)| category.matches(c))
            .map(|(i, _)| i)
            .collect();
        if self.filtered.is_empty() {
            self.selected = None;
        }
    }

    pub fn handle_key(&mut self, key: RemoteKey, channels: &[Channel]) -> Option<OverlayCommand> {
        if key == RemoteKey::Back {
            return Some(OverlayCommand::Dismissed);
        }
        match self.focus {
            EpgFocus::CategoryBar => self.handle_category_key(key, channels),
            EpgFocus::ChannelList => self.handle_list_key(key),
        }
    }

    fn handle_category_key(&mut self, key: RemoteKey, channels: &[Channel]) -> Option<OverlayCommand> {
        match key {
            RemoteKey::Left if self.category_index > 0 => {
                self.select_category(self.category_index - 1, channels);
            }
            RemoteKey::Right if self.category_index + 1 < self.categories.len() => {
                self.select_category(self.category_index + 1, channels);
            }
            RemoteKey::Down | RemoteKey::Center if self.selected.is_some() => {
                self.focus = EpgFocus::ChannelList;
            }
            _ => {}
        }
        None
    }

    fn handle_list_key(&mut self, key: RemoteKey) -> Option<OverlayCommand> {
        let Some(pos) = self.selected else {
            self.focus = EpgFocus::CategoryBar;
            return None;
        };
        match key {
            RemoteKey::Up if pos == 0 => self.focus = EpgFocus::CategoryBar,
            RemoteKey::Up => self.selected = Some(pos - 1),
            RemoteKey::Down => self.selected = Some((pos + 1).min(self.filtered.len() - 1)),
            RemoteKey::Left => self.focus = EpgFocus::CategoryBar,
            RemoteKey::Center => return self.selected_channel().map(OverlayCommand::ChannelSelected),
            RemoteKey::Right | RemoteKey::Rewind => {
                return self.selected_channel().map(OverlayCommand::RewindRequested)
            }
            RemoteKey::Favorite => return self.selected_channel().map(OverlayCommand::FavoriteToggled),
            _ => {}
        }
        None
    }
}

// ── Rewind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindFocus {
    Day,
    Hour,
    Minute,
    Confirm,
}

impl RewindFocus {
    fn left(self) -> Self {
        match self {
            RewindFocus::Day | RewindFocus::Hour => RewindFocus::Day,
            RewindFocus::Minute => RewindFocus::Hour,
            RewindFocus::Confirm => RewindFocus::Minute,
        }
    }

    fn right(self) -> Self {
        match self {
            RewindFocus::Day => RewindFocus::Hour,
            RewindFocus::Hour => RewindFocus::Minute,
            RewindFocus::Minute | RewindFocus::Confirm => RewindFocus::Confirm,
        }
    }

    fn column(self) -> Option<PickerColumn> {
        match self {
            RewindFocus::Day => Some(PickerColumn::Day),
            RewindFocus::Hour => Some(PickerColumn::Hour),
            RewindFocus::Minute => Some(PickerColumn::Minute),
            RewindFocus::Confirm => None,
        }
    }
}

/// Rewind picker overlay for one channel.
#[derive(Debug, Clone)]
pub struct RewindOverlay {
    channel_index: usize,
    picker: TimePicker,
    focus: RewindFocus,
}

impl RewindOverlay {
    pub fn new(channel_index: usize, picker: TimePicker) -> Self {
        Self {
            channel_index,
            picker,
            focus: RewindFocus::Day,
        }
    }

    pub fn channel_index(&self) -> usize {
        self.channel_index
    }

    pub fn picker(&self) -> &TimePicker {
        &self.picker
    }

    pub fn focus(&self) -> RewindFocus {
        self.focus
    }

    pub fn displayed_instant(&self) -> Option<DateTime<Local>> {
        self.picker.selected_instant()
    }

    pub fn is_out_of_range(&self) -> bool {
        self.picker.is_out_of_range()
    }

    pub fn handle_key(&mut self, key: RemoteKey) -> Option<OverlayCommand> {
        match key {
            RemoteKey::Back => return Some(OverlayCommand::Dismissed),
            RemoteKey::Left => self.focus = self.focus.left(),
            RemoteKey::Right => self.focus = self.focus.right(),
            RemoteKey::Up | RemoteKey::Down => {
                if let Some(column) = self.focus.column() {
                    let delta = if key == RemoteKey::Up { -1 } else { 1 };
                    self.picker.move_column(column, delta);
                }
            }
            RemoteKey::Center if self.focus == RewindFocus::Confirm => return self.confirm(),
            RemoteKey::Center => self.focus = self.focus.right(),
            _ => {}
        }
        None
    }

    /// Rejected while out of range or when there is nothing to select.
    fn confirm(&self) -> Option<OverlayCommand> {
        if !self.picker.can_confirm() {
            debug!("rewind: confirm rejected (out of range or empty domain)");
            return None;
        }
        self.picker
            .selected_instant()
            .map(OverlayCommand::RewindConfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tv_proto::archive::ArchivePolicy;
    use tv_proto::protocol::{ArchiveLimit, ArchiveWindow};

    fn ch(id: &str, category: &str, favorite: bool) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            category: category.to_string(),
            favorite,
            ..Channel::default()
        }
    }

    fn lineup() -> Vec<Channel> {
        vec![
            ch("a", "News", false),
            ch("b", "Kids", true),
            ch("c", "News", false),
            ch("d", "", false),
        ]
    }

    #[test]
    fn test_categories_in_first_seen_order() {
        let labels: Vec<_> = build_categories(&lineup())
            .iter()
            .map(|c| c.label().to_string())
            .collect();
        assert_eq!(labels, vec!["All", "Favorites", "News", "Kids"]);
    }

    #[test]
    fn test_open_highlights_current_channel() {
        let epg = EpgOverlay::open(&lineup(), 2);
        assert_eq!(epg.focus(), EpgFocus::ChannelList);
        assert_eq!(epg.selected_channel(), Some(2));
        assert_eq!(epg.filtered().len(), 4);
    }

    #[test]
    fn test_category_change_resets_selection() {
        let channels = lineup();
        let mut epg = EpgOverlay::open(&channels, 3);
        epg.handle_key(RemoteKey::Left, &channels);
        assert_eq!(epg.focus(), EpgFocus::CategoryBar);

        epg.handle_key(RemoteKey::Right, &channels); // Favorites
        assert_eq!(epg.filtered(), &[1]);
        assert_eq!(epg.selected(), Some(0));

        epg.handle_key(RemoteKey::Right, &channels); // News
        assert_eq!(epg.filtered(), &[0, 2]);
        assert_eq!(epg.selected_channel(), Some(0));

        epg.handle_key(RemoteKey::Down, &channels);
        epg.handle_key(RemoteKey::Down, &channels);
        epg.handle_key(RemoteKey::Down, &channels);
        assert_eq!(epg.selected_channel(), Some(2));
        assert_eq!(
            epg.handle_key(RemoteKey::Center, &channels),
            Some(OverlayCommand::ChannelSelected(2))
        );
    }

    #[test]
    fn test_empty_filter_holds_no_selection() {
        let mut channels = lineup();
        channels[1].favorite = false;
        let mut epg = EpgOverlay::open(&channels, 0);
        epg.handle_key(RemoteKey::Left, &channels);
        epg.handle_key(RemoteKey::Right, &channels);
        assert!(epg.filtered().is_empty());
        assert_eq!(epg.selected(), None);
        // can't enter an empty list
        epg.handle_key(RemoteKey::Down, &channels);
        assert_eq!(epg.focus(), EpgFocus::CategoryBar);
    }

    #[test]
    fn test_refresh_clamps_after_favorite_removed() {
        let mut channels = lineup();
        channels[0].favorite = true;
        let mut epg = EpgOverlay::open(&channels, 0);
        epg.select_category(1, &channels);
        epg.handle_key(RemoteKey::Down, &channels);
        assert_eq!(epg.selected_channel(), Some(1));

        channels[1].favorite = false;
        epg.refresh(&channels);
        assert_eq!(epg.filtered(), &[0]);
        assert_eq!(epg.selected(), Some(0));

        channels[0].favorite = false;
        epg.refresh(&channels);
        assert_eq!(epg.selected(), None);
        assert_eq!(epg.focus(), EpgFocus::CategoryBar);
    }

    #[test]
    fn test_list_right_requests_rewind() {
        let channels = lineup();
        let mut epg = EpgOverlay::open(&channels, 1);
        assert_eq!(
            epg.handle_key(RemoteKey::Right, &channels),
            Some(OverlayCommand::RewindRequested(1))
        );
        assert_eq!(
            epg.handle_key(RemoteKey::Favorite, &channels),
            Some(OverlayCommand::FavoriteToggled(1))
        );
        assert_eq!(
            epg.handle_key(RemoteKey::Back, &channels),
            Some(OverlayCommand::Dismissed)
        );
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 20, 15, 30, 0).unwrap()
    }

    fn rewind(hours: u32) -> RewindOverlay {
        let window = ArchiveWindow::new(ArchiveLimit::Bounded(hours));
        RewindOverlay::new(0, TimePicker::open(window, ArchivePolicy::default(), now()))
    }

    #[test]
    fn test_rewind_focus_moves_without_wrap() {
        let mut overlay = rewind(48);
        assert_eq!(overlay.picker().domain().len(), 3);
        assert_eq!(overlay.picker().selection().unwrap().day_index, 2);
        assert_eq!(overlay.picker().selection().unwrap().hour, 15);

        overlay.handle_key(RemoteKey::Left);
        assert_eq!(overlay.focus(), RewindFocus::Day);
        overlay.handle_key(RemoteKey::Right);
        assert_eq!(overlay.focus(), RewindFocus::Hour);
        overlay.handle_key(RemoteKey::Right);
        assert_eq!(overlay.focus(), RewindFocus::Minute);
        overlay.handle_key(RemoteKey::Right);
        overlay.handle_key(RemoteKey::Right);
        assert_eq!(overlay.focus(), RewindFocus::Confirm);
    }

    #[test]
    fn test_vertical_keys_move_focused_column_only() {
        let mut overlay = rewind(48);
        overlay.handle_key(RemoteKey::Up);
        assert_eq!(overlay.picker().selection().unwrap().day_index, 1);
        overlay.handle_key(RemoteKey::Right);
        overlay.handle_key(RemoteKey::Down);
        assert_eq!(overlay.picker().selection().unwrap().hour, 16);
        assert_eq!(
            overlay.displayed_instant(),
            Some(Local.with_ymd_and_hms(2024, 6, 19, 16, 30, 0).unwrap())
        );

        overlay.handle_key(RemoteKey::Right);
        overlay.handle_key(RemoteKey::Right);
        let before = overlay.picker().selection();
        overlay.handle_key(RemoteKey::Up);
        assert_eq!(overlay.picker().selection(), before);
    }

    #[test]
    fn test_confirm_rejected_out_of_range() {
        let mut overlay = rewind(48);
        overlay.handle_key(RemoteKey::Up);
        overlay.handle_key(RemoteKey::Up); // oldest day, 15:30, 48h back exactly
        overlay.handle_key(RemoteKey::Right);
        overlay.handle_key(RemoteKey::Up); // 14:30, now 49h back
        assert!(overlay.is_out_of_range());
        overlay.handle_key(RemoteKey::Right);
        overlay.handle_key(RemoteKey::Right);
        assert_eq!(overlay.focus(), RewindFocus::Confirm);
        assert_eq!(overlay.handle_key(RemoteKey::Center), None);

        overlay.handle_key(RemoteKey::Left);
        overlay.handle_key(RemoteKey::Left);
        overlay.handle_key(RemoteKey::Down); // 15:30 again
        overlay.handle_key(RemoteKey::Center);
        overlay.handle_key(RemoteKey::Center);
        assert_eq!(overlay.focus(), RewindFocus::Confirm);
        assert_eq!(
            overlay.handle_key(RemoteKey::Center),
            Some(OverlayCommand::RewindConfirmed(
                Local.with_ymd_and_hms(2024, 6, 18, 15, 30, 0).unwrap()
            ))
        );
    }

    #[test]
    fn test_empty_domain_never_confirms() {
        let mut overlay = rewind(0);
        for key in [RemoteKey::Right, RemoteKey::Right, RemoteKey::Right] {
            overlay.handle_key(key);
        }
        assert_eq!(overlay.handle_key(RemoteKey::Center), None);
        assert!(overlay.displayed_instant().is_none());
    }
}
