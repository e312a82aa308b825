//! Serde utilities for glam types (glam's serde feature is not enabled).

/// Serde proxy for Vec3, used as `#[serde(with = "vec3_serde")]`.
pub mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Vec3Repr {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S>(vec: &Vec3, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Vec3Repr { x: vec.x, y: vec.y, z: vec.z }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = Vec3Repr::deserialize(deserializer)?;
        Ok(Vec3::new(repr.x, repr.y, repr.z))
    }
}

/// Serde proxy for IVec3 grid sizes and cell indices.
pub mod ivec3_serde {
    use glam::IVec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct IVec3Repr {
        x: i32,
        y: i32,
        z: i32,
    }

    pub fn serialize<S>(vec: &IVec3, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        IVec3Repr { x: vec.x, y: vec.y, z: vec.z }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<IVec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = IVec3Repr::deserialize(deserializer)?;
        Ok(IVec3::new(repr.x, repr.y, repr.z))
    }
}
