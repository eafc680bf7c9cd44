use std::fmt;

/// The kind of upstream resource looked up by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Species,
    Films,
    Pilots,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Species => "species",
            ItemKind::Films => "films",
            ItemKind::Pilots => "pilots",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical upstream resource in both cache layers.
///
/// The [`Display`](fmt::Display) rendering is the key used in the shared cache. Item ids are
/// path segments and never contain `/`, while batch and search keys always do, so distinct keys
/// never render to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One page of a paginated listing, identified by its full URL.
    Page { url: String },
    /// A single item of a batch lookup, e.g. `species_3`.
    Item { kind: ItemKind, id: String },
    /// A lookup of several items in one request, e.g. `pilots_batch/1/13`.
    Batch { kind: ItemKind, ids: Vec<String> },
    /// A named one-off lookup, like a search by title.
    Search { name: String },
    /// Flight data from the OData service, stored with a timestamp.
    OData { user_id: String },
}

impl CacheKey {
    /// The key of the page at `url`.
    pub fn page(url: impl Into<String>) -> Self {
        Self::Page { url: url.into() }
    }

    /// The key of a batch item, derived from the last path segment of its `url`.
    pub fn item(kind: ItemKind, url: &str) -> Self {
        Self::Item {
            kind,
            id: last_path_segment(url).to_owned(),
        }
    }

    pub fn batch<I, S>(kind: ItemKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Batch {
            kind,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search(name: impl Into<String>) -> Self {
        Self::Search { name: name.into() }
    }

    pub fn odata(user_id: impl Into<String>) -> Self {
        Self::OData {
            user_id: user_id.into(),
        }
    }

    /// The kind of resource, for use in metric tags.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Page { .. } => "page",
            CacheKey::Item { .. } => "item",
            CacheKey::Batch { .. } => "batch",
            CacheKey::Search { .. } => "search",
            CacheKey::OData { .. } => "odata",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Page { url } => write!(f, "vehicles_data_{url}"),
            CacheKey::Item { kind, id } => write!(f, "{kind}_{id}"),
            CacheKey::Batch { kind, ids } => write!(f, "{kind}_batch/{}", ids.join("/")),
            CacheKey::Search { name } => write!(f, "search/{name}"),
            CacheKey::OData { user_id } => write!(f, "odata_flight_{user_id}"),
        }
    }
}

/// Returns the last path segment of `url`, ignoring trailing slashes.
///
/// `https://swapi.dev/api/species/3/` yields `3`.
pub fn last_path_segment(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, segment)) => segment,
        None => trimmed,
    }
}
