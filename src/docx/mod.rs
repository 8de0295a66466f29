pub mod body;
pub mod package;
pub mod paragraph;
pub mod rebuild;
pub mod template;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;
