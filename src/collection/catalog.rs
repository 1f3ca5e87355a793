//! Imported request templates and their addressing

use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ordered string mapping used for headers and query params
pub type StringMap = IndexMap<String, String>;

/// Subcategory label used for requests that sit directly in a top-level folder
pub const MAIN_SUBCATEGORY: &str = "Main";

/// HTTP methods the executor knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Methods whose requests normally carry a JSON body
    pub fn expects_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(AppError::validation(
                "method",
                format!("unsupported HTTP method '{}'", other),
            )),
        }
    }
}

/// `"Main"` or `"Main|Sub"`: the folder/subfolder a request came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn new(main: &str, sub: Option<&str>) -> Self {
        match sub {
            Some(sub) => Self(format!("{}|{}", main, sub)),
            None => Self(main.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn main(&self) -> &str {
        self.0.split_once('|').map_or(self.0.as_str(), |(main, _)| main)
    }

    /// Subcategory name, or `"Main"` for un-nested keys
    pub fn sub(&self) -> &str {
        self.0
            .split_once('|')
            .map_or(MAIN_SUBCATEGORY, |(_, sub)| sub)
    }

    pub fn is_nested(&self) -> bool {
        self.0.contains('|')
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Addresses one request template: rendered as `"{category} - {name}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub category: CategoryKey,
    pub name: String,
}

impl MethodKey {
    pub fn new(category: impl Into<CategoryKey>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.category, self.name)
    }
}

impl Serialize for MethodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A request exactly as imported. Never mutated after import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestTemplate {
    pub method: HttpMethod,
    /// Scheme and host; `None` when the collection only gave a path
    pub base_url: Option<String>,
    pub path: String,
    pub headers: StringMap,
    pub body: String,
    pub params: StringMap,
}

/// One main category with its subcategories, for browsing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    pub name: String,
    pub total_methods: usize,
    /// Subcategory name (`"Main"` for direct children) to method names
    pub subcategories: IndexMap<String, Vec<String>>,
}

/// All imported templates, grouped by category key in import order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: IndexMap<CategoryKey, IndexMap<String, RequestTemplate>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under a name unique within `category`, returning the name used.
    ///
    /// Collisions get `" (n)"` appended, starting at 2.
    pub fn insert(&mut self, category: CategoryKey, name: &str, template: RequestTemplate) -> String {
        let methods = self.categories.entry(category).or_default();

        let mut unique = name.to_string();
        let mut counter = 2;
        while methods.contains_key(&unique) {
            unique = format!("{} ({})", name, counter);
            counter += 1;
        }

        methods.insert(unique.clone(), template);
        unique
    }

    pub fn get(&self, key: &MethodKey) -> Option<&RequestTemplate> {
        self.categories
            .get(&key.category)
            .and_then(|methods| methods.get(&key.name))
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.get(key).is_some()
    }

    /// Find the key whose rendered form is `raw`
    pub fn lookup(&self, raw: &str) -> Option<MethodKey> {
        self.categories.iter().find_map(|(category, methods)| {
            let name = raw.strip_prefix(category.as_str())?.strip_prefix(" - ")?;
            methods
                .contains_key(name)
                .then(|| MethodKey::new(category.clone(), name))
        })
    }

    /// Like [`lookup`](Self::lookup) but reports an unknown key as an error
    pub fn require(&self, raw: &str) -> AppResult<MethodKey> {
        self.lookup(raw)
            .ok_or_else(|| AppError::UnknownMethod(raw.to_string()))
    }

    pub fn category_keys(&self) -> impl Iterator<Item = &CategoryKey> {
        self.categories.keys()
    }

    pub fn methods(&self, category: &CategoryKey) -> impl Iterator<Item = (&String, &RequestTemplate)> {
        self.categories.get(category).into_iter().flatten()
    }

    /// Every key in import order
    pub fn keys(&self) -> Vec<MethodKey> {
        self.categories
            .iter()
            .flat_map(|(category, methods)| {
                methods
                    .keys()
                    .map(move |name| MethodKey::new(category.clone(), name.clone()))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MethodKey, &RequestTemplate)> {
        self.categories.iter().flat_map(|(category, methods)| {
            methods
                .iter()
                .map(move |(name, t)| (MethodKey::new(category.clone(), name.clone()), t))
        })
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn method_count(&self, category: &CategoryKey) -> usize {
        self.categories.get(category).map_or(0, IndexMap::len)
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }

    /// Main categories sorted by name, each with its subcategories
    pub fn category_tree(&self) -> Vec<CategoryNode> {
        let mut tree: IndexMap<String, IndexMap<String, Vec<String>>> = IndexMap::new();

        for (category, methods) in &self.categories {
            tree.entry(category.main().to_string())
                .or_default()
                .entry(category.sub().to_string())
                .or_default()
                .extend(methods.keys().cloned());
        }

        let mut nodes: Vec<CategoryNode> = tree
            .into_iter()
            .map(|(name, subcategories)| CategoryNode {
                total_methods: subcategories.values().map(Vec::len).sum(),
                name,
                subcategories,
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }
}
