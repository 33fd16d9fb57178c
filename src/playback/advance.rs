use crate::models::Container;

/// Current-track pointer into the active container
///
/// Moves only on explicit selection or when a track ends; at the last
/// track `advance` returns `None` and the pointer stays put (no looping).
#[derive(Debug, Default)]
pub struct AutoAdvance {
    container: Option<Container>,
    current: Option<usize>,
}

impl AutoAdvance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_container(&mut self, container: Container) {
        self.container = Some(container);
        self.current = None;
    }

    pub fn clear(&mut self) {
        self.container = None;
        self.current = None;
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    /// Point at `track_id`. Returns false when it is not part of the container.
    pub fn select(&mut self, track_id: &str) -> bool {
        match self.container.as_ref().and_then(|c| c.position_of(track_id)) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    /// The track after the current one, without moving
    pub fn peek_next(&self) -> Option<&str> {
        let container = self.container.as_ref()?;
        container.track_ids.get(self.current? + 1).map(String::as_str)
    }

    pub fn peek_previous(&self) -> Option<&str> {
        let container = self.container.as_ref()?;
        let index = self.current?.checked_sub(1)?;
        container.track_ids.get(index).map(String::as_str)
    }

    /// Move to the next track when the current one ends
    pub fn advance(&mut self) -> Option<String> {
        let next = self.peek_next()?.to_string();
        self.current = self.current.map(|i| i + 1);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Container {
        Container::new("book", vec!["ch1".into(), "ch2".into(), "ch3".into()])
    }

    #[test]
    fn test_advance_walks_in_order() {
        let mut advance = AutoAdvance::new();
        advance.set_container(book());
        assert!(advance.select("ch1"));

        assert_eq!(advance.advance().as_deref(), Some("ch2"));
        assert_eq!(advance.advance().as_deref(), Some("ch3"));
        assert_eq!(advance.advance(), None);
        assert_eq!(advance.peek_previous(), Some("ch2"));
    }

    #[test]
    fn test_select_outside_container() {
        let mut advance = AutoAdvance::new();
        advance.set_container(book());
        assert!(!advance.select("other"));
        assert_eq!(advance.peek_previous(), None);
        assert_eq!(advance.advance(), None);
    }

    #[test]
    fn test_peek_previous() {
        let mut advance = AutoAdvance::new();
        advance.set_container(book());
        advance.select("ch1");
        assert_eq!(advance.peek_previous(), None);
        advance.select("ch3");
        assert_eq!(advance.peek_previous(), Some("ch2"));
    }

    #[test]
    fn test_no_container() {
        let mut advance = AutoAdvance::new();
        assert!(!advance.select("ch1"));
        assert_eq!(advance.peek_next(), None);
        assert_eq!(advance.advance(), None);
    }
}
