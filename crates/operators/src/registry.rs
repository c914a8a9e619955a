// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The process-wide kernel registry.
//!
//! Registration is **explicit**: [`init_operators`] walks a hand-written
//! list instead of relying on link-time static constructors, so a
//! stripped binary can never silently lose kernels. The session
//! constructor calls it once; further calls are no-ops.

use crate::op::{Operator, OperatorFactory};
use crate::OpError;
use graph_ir::Attributes;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Maps op-type names to kernel factories. Read-only after
/// construction; safe for concurrent reads.
pub struct OperatorRegistry {
    factories: HashMap<&'static str, OperatorFactory>,
}

impl OperatorRegistry {
    fn register(&mut self, op_type: &'static str, factory: OperatorFactory) {
        self.factories.insert(op_type, factory);
    }

    /// Builds a kernel for `op_type` from the node's attributes.
    ///
    /// # Errors
    /// [`OpError::UnknownOp`] when nothing is registered under the name.
    pub fn create(
        &self,
        op_type: &str,
        attrs: &Attributes,
    ) -> Result<Box<dyn Operator>, OpError> {
        let factory = self
            .factories
            .get(op_type)
            .ok_or_else(|| OpError::UnknownOp(op_type.to_string()))?;
        factory(attrs)
    }

    /// Returns `true` if a factory is registered for `op_type`.
    pub fn is_registered(&self, op_type: &str) -> bool {
        self.factories.contains_key(op_type)
    }

    /// Returns the registered op-type names, sorted.
    pub fn registered_ops(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

static REGISTRY: Lazy<OperatorRegistry> = Lazy::new(build_registry);

fn build_registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry {
        factories: HashMap::new(),
    };

    // Arithmetic.
    registry.register("Add", crate::math::Add::factory);
    registry.register("Sub", crate::math::Sub::factory);
    registry.register("Mul", crate::math::Mul::factory);
    registry.register("Div", crate::math::Div::factory);
    registry.register("MatMul", crate::math::MatMul::factory);

    // Activations.
    registry.register("Relu", crate::activation::Relu::factory);
    registry.register("Sigmoid", crate::activation::Sigmoid::factory);
    registry.register("Tanh", crate::activation::Tanh::factory);
    registry.register("Gelu", crate::activation::Gelu::factory);
    registry.register("Silu", crate::activation::Silu::factory);
    registry.register("Softmax", crate::softmax::Softmax::factory);

    // Normalization.
    registry.register(
        "BatchNormalization",
        crate::normalization::BatchNormalization::factory,
    );
    registry.register(
        "LayerNormalization",
        crate::normalization::LayerNormalization::factory,
    );
    registry.register("RMSNorm", crate::normalization::RmsNorm::factory);

    // Convolution and pooling.
    registry.register("Conv", crate::conv::Conv::factory);
    registry.register("MaxPool", crate::pooling::Pool::max_factory);
    registry.register("AveragePool", crate::pooling::Pool::average_factory);

    // Shape manipulation.
    registry.register("Reshape", crate::shape_ops::Reshape::factory);
    registry.register("Transpose", crate::shape_ops::Transpose::factory);
    registry.register("Concat", crate::shape_ops::Concat::factory);
    registry.register("Split", crate::shape_ops::Split::factory);
    registry.register("Gather", crate::shape_ops::Gather::factory);
    registry.register("Slice", crate::shape_ops::Slice::factory);

    // Lookup.
    registry.register("Embedding", crate::embedding::Embedding::factory);

    // Fused.
    registry.register("FusedConvBNReLU", crate::fused::FusedConvBnRelu::factory);
    registry.register("FusedMatMulAdd", crate::fused::FusedMatMulAdd::factory);

    tracing::debug!("operator registry ready: {} kernels", registry.factories.len());
    registry
}

/// Returns the shared registry, building it on first use.
pub fn registry() -> &'static OperatorRegistry {
    &REGISTRY
}

/// Forces registration of every built-in kernel. Idempotent.
pub fn init_operators() {
    Lazy::force(&REGISTRY);
}
