use std::collections::BTreeMap;

/// One node of the tree: string values plus named child namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    values: BTreeMap<String, String>,
    children: BTreeMap<String, Namespace>,
}

impl Namespace {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn child(&self, name: &str) -> Option<&Namespace> {
        self.children.get(name)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn insert_value(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }

    pub(crate) fn insert_child(&mut self, name: String, child: Namespace) {
        self.children.insert(name, child);
    }

    pub(crate) fn from_values(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            children: BTreeMap::new(),
        }
    }

    /// Walk `path` without creating anything.
    pub(crate) fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Namespace> {
        let mut node = self;
        for segment in path {
            node = node.children.get(segment.as_ref())?;
        }
        Some(node)
    }

    /// Walk `path`, creating missing namespaces on the way.
    pub(crate) fn lookup_or_create<S: AsRef<str>>(&mut self, path: &[S]) -> &mut Namespace {
        let mut node = self;
        for segment in path {
            node = node
                .children
                .entry(segment.as_ref().to_string())
                .or_default();
        }
        node
    }
}
