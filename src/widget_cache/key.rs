use std::fmt;

const KEY_PREFIX: &str = "widget";

/// Identifies a cached widget payload.
///
/// Global keys (`widget:{widget_id}`) are shared by every user and live only in
/// memory. Owner-scoped keys (`widget:{widget_id}:{owner_id}`) are also
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    widget_id: String,
    owner_id: Option<String>,
}

impl CacheKey {
    pub fn global(widget_id: impl Into<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            owner_id: None,
        }
    }

    pub fn owned(widget_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            owner_id: Some(owner_id.into()),
        }
    }

    /// Parses a rendered key. Returns `None` for anything that is not
    /// `widget:{id}` or `widget:{id}:{owner}` with non-empty parts.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix(KEY_PREFIX)?.strip_prefix(':')?;
        let (widget_id, owner_id) = match rest.split_once(':') {
            Some((widget_id, owner_id)) => (widget_id, Some(owner_id)),
            None => (rest, None),
        };
        if widget_id.is_empty() || owner_id.is_some_and(str::is_empty) {
            return None;
        }
        Some(Self {
            widget_id: widget_id.to_string(),
            owner_id: owner_id.map(str::to_string),
        })
    }

    /// Like [`parse`](Self::parse), but also accepts the bare
    /// `{widget_id}` and `{widget_id}:{owner_id}` forms.
    pub fn from_pattern(s: &str) -> Option<Self> {
        if let Some(key) = Self::parse(s) {
            return Some(key);
        }
        let (widget_id, owner_id) = match s.split_once(':') {
            Some((widget_id, owner_id)) => (widget_id, Some(owner_id)),
            None => (s, None),
        };
        if widget_id.is_empty() || owner_id.is_some_and(|o| o.is_empty() || o.contains(':')) {
            return None;
        }
        Some(Self {
            widget_id: widget_id.to_string(),
            owner_id: owner_id.map(str::to_string),
        })
    }

    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn is_owner_scoped(&self) -> bool {
        self.owner_id.is_some()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner_id {
            Some(owner_id) => write!(f, "{}:{}:{}", KEY_PREFIX, self.widget_id, owner_id),
            None => write!(f, "{}:{}", KEY_PREFIX, self.widget_id),
        }
    }
}
