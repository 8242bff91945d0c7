//! Core corpus types: fragments, interpreters and the theme vocabulary

pub mod fragment;
pub mod theme;

pub use fragment::{ContentType, FragmentMetadata, Interpreter, KnowledgeFragment, SparseVector};
pub use theme::{
    ConceptMapping, FragmentThemeAssociation, ThemeAssociationIndex, ThemeTag, ThemeVocabulary,
};
