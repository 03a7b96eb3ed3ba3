//! Rider identity generation.

use fake::Fake;
use fake::faker::name::en::FirstName;
use rand::Rng;

/// A simulated rider: a stable device id plus a display name.
#[derive(Debug, Clone)]
pub struct Rider {
    pub device_id: String,
    pub name: String,
}

/// Generates `count` riders with device ids `<prefix>1..<prefix>N`.
pub fn generate(prefix: &str, count: usize, rng: &mut impl Rng) -> Vec<Rider> {
    (0..count)
        .map(|i| {
            let name: String = FirstName().fake_with_rng(rng);
            Rider {
                device_id: format!("{prefix}{}", i + 1),
                name,
            }
        })
        .collect()
}
