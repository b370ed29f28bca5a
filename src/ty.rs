/// The only value type of the language: a signed machine word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  Int,
}

impl Type {
  /// Resolve a type name as written in a declaration.
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "int" => Some(Type::Int),
      _ => None,
    }
  }

  pub fn size(&self) -> i64 {
    match self {
      Type::Int => 8,
    }
  }
}

/// Round `n` up to the next multiple of `align`.
pub fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_int_only() {
    assert_eq!(Type::from_name("int"), Some(Type::Int));
    assert_eq!(Type::from_name("float"), None);
    assert_eq!(Type::Int.size(), 8);
  }

  #[test]
  fn aligns_up_to_multiple() {
    assert_eq!(align_to(0, 16), 0);
    assert_eq!(align_to(8, 16), 16);
    assert_eq!(align_to(16, 16), 16);
    assert_eq!(align_to(24, 16), 32);
  }
}
