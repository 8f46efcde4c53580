// src/inspector.rs

//! Tools for inspecting resolved shapes.
//! useful for checking what the correlator matched before relying on it.

use serde::Serialize;

use crate::descriptor::{Classification, TypeDescriptor};

/// A structural report of a resolved type.
#[derive(Debug, Clone, Serialize)]
pub struct ShapeReport {
    /// Full name of the subject type.
    pub type_name: String,
    /// Full name of the carrier type, when it differs from the subject.
    pub carrier: Option<String>,
    /// How the descriptor was obtained.
    pub classification: Classification,
    /// Raw carrier type of an atomic bridge.
    pub data_type: Option<String>,
    /// Name of the designated constructor.
    pub constructor: Option<String>,
    /// Components in canonical order.
    pub components: Vec<ComponentReport>,
}

/// One component of a [`ShapeReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    /// Field identifier.
    pub name: String,
    /// Position in the canonical order.
    pub position: usize,
    /// Accessor method reading the field.
    pub accessor: String,
    /// Shape of the component type.
    pub shape: ShapeReport,
}

impl ShapeReport {
    /// Builds the report of `descriptor` and, recursively, its components.
    pub fn of(descriptor: &TypeDescriptor) -> Self {
        let subject = descriptor.subject();
        let carrier = descriptor.carrier();

        Self {
            type_name: subject.name().to_string(),
            carrier: (carrier != subject).then(|| carrier.name().to_string()),
            classification: descriptor.classification(),
            data_type: descriptor.bridge().map(|b| b.data_type().to_string()),
            constructor: descriptor.constructor_name().map(str::to_string),
            components: descriptor
                .components()
                .iter()
                .map(|component| ComponentReport {
                    name: component.name().to_string(),
                    position: component.position(),
                    accessor: component.accessor_name().to_string(),
                    shape: Self::of(component.descriptor()),
                })
                .collect(),
        }
    }

    fn fmt_recursive(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        label: Option<&ComponentReport>,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };

        let head = match label {
            Some(c) => format!("[{}] {}() -> ", c.position, c.accessor),
            None => String::new(),
        };
        let extra = match (&self.carrier, &self.data_type) {
            (Some(carrier), _) => format!(" via {carrier}"),
            (None, Some(data)) => format!(" as {data}"),
            (None, None) => String::new(),
        };

        writeln!(
            f,
            "{}{}{}{} ({}){}",
            prefix, connector, head, self.type_name, self.classification, extra
        )?;

        for (i, child) in self.components.iter().enumerate() {
            let is_last_child = i == self.components.len() - 1;
            child.shape.fmt_recursive(
                f,
                &format!("{}{}", prefix, child_prefix),
                Some(child),
                is_last_child,
            )?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ShapeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== SHAPE REPORT ===")?;
        self.fmt_recursive(f, "", None, true)
    }
}
