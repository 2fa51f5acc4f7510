use super::{LeakyRelu, Sigmoid, Tanh};

/// An element-wise activation function, applied right after a layer's affine transform.
#[derive(Clone, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Tanh(Tanh),
    LeakyRelu(LeakyRelu),
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn tanh() -> Self {
        Self::Tanh(Tanh)
    }

    pub fn leaky_relu(slope: f32) -> Self {
        Self::LeakyRelu(LeakyRelu::new(slope))
    }

    /// Evaluates the function at `z`.
    pub fn f(&self, z: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(z),
            Self::Tanh(a) => a.f(z),
            Self::LeakyRelu(a) => a.f(z),
        }
    }

    /// Evaluates the function's derivative at `z`.
    pub fn df(&self, z: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(z),
            Self::Tanh(a) => a.df(z),
            Self::LeakyRelu(a) => a.df(z),
        }
    }
}
