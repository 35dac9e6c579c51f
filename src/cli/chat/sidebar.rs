/// Terminals at or below this width get the narrow layout: the sidebar
/// starts closed and closes again after starting a new story.
pub const NARROW_LAYOUT_COLUMNS: u16 = 80;

pub const HISTORY_ENTRIES: [&str; 2] = ["Yesterday's Story", "Lion and the Mouse"];

pub fn is_narrow(columns: u16) -> bool {
    columns <= NARROW_LAYOUT_COLUMNS
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarState {
    open: bool,
    narrow: bool,
}

impl SidebarState {
    pub fn for_width(columns: u16) -> Self {
        let narrow = is_narrow(columns);
        Self { open: !narrow, narrow }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Called after a new story starts.
    pub fn on_new_story(&mut self) {
        if self.narrow {
            self.close();
        }
    }

    pub fn history(&self) -> &'static [&'static str] {
        &HISTORY_ENTRIES
    }
}
