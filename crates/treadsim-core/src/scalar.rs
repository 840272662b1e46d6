/// Engine float type. Everything downstream of the scene parser is single precision.
pub type Scalar = f32;
