/// Port and signal types for module interconnection

/// A wire/signal that carries data between modules
/// 所有信号线自动包含valid标志
#[derive(Clone)]
pub struct Wire<T: Clone> {
  pub value: T,
  pub valid: bool,
}

impl<T: Clone> Wire<T> {
  pub fn new(value: T) -> Self {
    Self { value, valid: false }
  }

  pub fn set(&mut self, value: T) {
    self.value = value;
    self.valid = true;
  }

  pub fn clear(&mut self) {
    self.valid = false;
  }

  /// Consume the value if valid, clearing the wire
  pub fn take(&mut self) -> Option<T> {
    if self.valid {
      self.valid = false;
      Some(self.value.clone())
    } else {
      None
    }
  }
}

impl<T: Clone + Default> Default for Wire<T> {
  fn default() -> Self {
    Self {
      value: T::default(),
      valid: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_starts_invalid() {
    let w: Wire<u32> = Wire::default();
    assert!(!w.valid);

    let w = Wire::new(42u32);
    assert!(!w.valid);
    assert_eq!(w.value, 42);
  }

  #[test]
  fn wire_set_take() {
    let mut w: Wire<u32> = Wire::default();
    w.set(7);
    assert!(w.valid);
    assert_eq!(w.take(), Some(7));
    assert!(!w.valid);
    assert_eq!(w.take(), None);
  }
}
