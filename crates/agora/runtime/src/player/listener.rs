use agora_types::{PlayerAddress, RoleAddress};

/// Observer of the roles a player gains and loses
pub trait PlayerListener: Send + Sync {
    fn role_obtained(&self, _player: &PlayerAddress, _role: &RoleAddress) {}

    fn role_released(&self, _player: &PlayerAddress, _role: &RoleAddress) {}
}
