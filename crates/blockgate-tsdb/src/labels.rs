use std::cmp::Ordering;
use std::fmt;

/// A single name/value pair of a series.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The label set identifying a series.
///
/// [`Labels::from_pairs`] sorts by name, which is the only order the index
/// accepts. [`Labels::from_unsorted`] keeps the caller's order and exists to
/// produce deliberately broken blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut labels = Self::from_unsorted(pairs);
        labels.0.sort();
        labels
    }

    pub fn from_unsorted(pairs: &[(&str, &str)]) -> Self {
        Self(pairs.iter().map(|(n, v)| Label::new(*n, *v)).collect())
    }

    pub(crate) fn from_vec(labels: Vec<Label>) -> Self {
        Self(labels)
    }

    /// Whether names are in strictly increasing order (sorted, no duplicates).
    pub fn is_strictly_sorted(&self) -> bool {
        self.0.windows(2).all(|w| w[0].name < w[1].name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialOrd for Labels {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Labels {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.name.cmp(&b.name).then_with(|| a.value.cmp(&b.value)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", l.name, l.value)?;
        }
        f.write_str("}")
    }
}
