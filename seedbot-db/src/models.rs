/// A community identity bound to a game player id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
  /// Canonical community identity (e.g. "name#1234")
  pub identity: String,
  /// 32-bit game account id
  pub player_id: u32,
}

impl Binding {
  pub fn new(identity: impl Into<String>, player_id: u32) -> Self {
    Self {
      identity: identity.into(),
      player_id,
    }
  }
}
