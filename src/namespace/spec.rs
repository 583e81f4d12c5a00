//! Path types addressing a value inside a [`super::Namespace`].

use std::fmt;

/// One step of a concrete path: a bare name, or a name paired with the
/// index of the element selected from the list/dict bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecElement {
    Name(String),
    Indexed(String, usize),
}

impl SpecElement {
    pub fn name(&self) -> &str {
        match self {
            SpecElement::Name(n) => n,
            SpecElement::Indexed(n, _) => n,
        }
    }
}

impl fmt::Display for SpecElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecElement::Name(n) => write!(f, "{n}"),
            SpecElement::Indexed(n, i) => write!(f, "{n}[{i}]"),
        }
    }
}

/// A fully concrete path through the namespace, e.g.
/// `dataset_input[0].cuts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Spec(Vec<SpecElement>);

impl Spec {
    pub fn elements(&self) -> &[SpecElement] {
        &self.0
    }

    pub fn push(&mut self, elem: SpecElement) {
        self.0.push(elem);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SpecElement>> for Spec {
    fn from(elements: Vec<SpecElement>) -> Self {
        Self(elements)
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// One step of a fuzzy path: a name, a name at a known index, or a
/// name left unindexed (expand over every element it resolves to).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FuzzySpecElement {
    Name(String),
    Indexed(String, usize),
    Unindexed(String),
}

/// A path that may fork into several concrete [`Spec`]s once resolved
/// against a namespace (§4.2 fuzzy-spec expansion).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzySpec(Vec<FuzzySpecElement>);

impl FuzzySpec {
    pub fn elements(&self) -> &[FuzzySpecElement] {
        &self.0
    }

    pub fn push(&mut self, elem: FuzzySpecElement) {
        self.0.push(elem);
    }
}

impl From<Vec<FuzzySpecElement>> for FuzzySpec {
    fn from(elements: Vec<FuzzySpecElement>) -> Self {
        Self(elements)
    }
}
