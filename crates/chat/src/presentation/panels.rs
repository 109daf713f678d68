/// Auxiliary views that share the space next to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    History,
    Discovery,
    Settings,
    Info,
}

impl Panel {
    pub fn label(self) -> &'static str {
        match self {
            Self::History => "Chat History",
            Self::Discovery => "Discovery",
            Self::Settings => "Settings",
            Self::Info => "Information",
        }
    }

    /// Settings and info replace the conversation area instead of sitting beside it.
    pub fn covers_conversation(self) -> bool {
        matches!(self, Self::Settings | Self::Info)
    }
}

/// At most one panel is open; switching never touches conversation data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelState {
    active: Option<Panel>,
}

impl PanelState {
    /// Opens `panel` (closing whichever was open) or closes it when already open.
    pub fn toggle(&mut self, panel: Panel) -> Option<Panel> {
        self.active = if self.active == Some(panel) {
            None
        } else {
            Some(panel)
        };
        self.active
    }

    pub fn close(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<Panel> {
        self.active
    }

    pub fn is_open(&self, panel: Panel) -> bool {
        self.active == Some(panel)
    }

    pub fn covers_conversation(&self) -> bool {
        self.active.is_some_and(Panel::covers_conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_one_panel_closes_the_others() {
        let mut panels = PanelState::default();
        assert_eq!(panels.toggle(Panel::History), Some(Panel::History));
        assert_eq!(panels.toggle(Panel::Discovery), Some(Panel::Discovery));
        assert!(!panels.is_open(Panel::History));
        assert_eq!(panels.toggle(Panel::Settings), Some(Panel::Settings));
        assert!(!panels.is_open(Panel::Discovery));
    }

    #[test]
    fn toggling_the_open_panel_closes_it() {
        let mut panels = PanelState::default();
        panels.toggle(Panel::History);
        assert_eq!(panels.toggle(Panel::History), None);
        assert_eq!(panels.active(), None);
    }

    #[test]
    fn only_settings_and_info_cover_the_conversation() {
        let mut panels = PanelState::default();
        panels.toggle(Panel::Discovery);
        assert!(!panels.covers_conversation());
        panels.toggle(Panel::Info);
        assert!(panels.covers_conversation());
        panels.close();
        assert!(!panels.covers_conversation());
    }
}
