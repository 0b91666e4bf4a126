//! Rendering seam.
//!
//! The engine does not draw widgets. A [`RendererRegistry`] maps a field's
//! `elementName` to a [`FieldRenderer`] supplied by the host, and
//! [`render_step`] walks a step in order, skipping fields that should not be
//! shown.

use std::collections::HashMap;

use serde_json::Value;

use crate::expr::value::to_number;
use crate::schema::{Field, Step};

/// Grid columns a field spans when it does not set `size`.
pub const DEFAULT_SPAN: u8 = 4;

const GRID_COLUMNS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Interactive,
    ReadOnly,
}

/// Draws one kind of field.
pub trait FieldRenderer: Send + Sync {
    type Output;

    fn render(&self, field: &Field, mode: RenderMode) -> Self::Output;
}

/// A rendered field, or a placeholder for an element nobody renders.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedField<O> {
    Widget {
        id: String,
        /// Grid columns out of 12
        span: u8,
        output: O,
    },
    Undefined {
        id: String,
        element_name: String,
    },
}

impl<O> RenderedField<O> {
    pub fn id(&self) -> &str {
        match self {
            RenderedField::Widget { id, .. } | RenderedField::Undefined { id, .. } => id,
        }
    }

    /// Placeholder text for undefined elements.
    pub fn placeholder(&self) -> Option<String> {
        match self {
            RenderedField::Undefined { element_name, .. } => {
                Some(format!("Element {} not defined", element_name))
            }
            RenderedField::Widget { .. } => None,
        }
    }
}

type BoxedRenderer<O> = Box<dyn FieldRenderer<Output = O>>;

/// Renderers keyed by `elementName`.
pub struct RendererRegistry<O> {
    renderers: HashMap<String, BoxedRenderer<O>>,
    fallback: Option<BoxedRenderer<O>>,
}

impl<O> Default for RendererRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> RendererRegistry<O> {
    pub fn new() -> Self {
        Self {
            renderers: HashMap::new(),
            fallback: None,
        }
    }

    pub fn register(
        mut self,
        element_name: impl Into<String>,
        renderer: impl FieldRenderer<Output = O> + 'static,
    ) -> Self {
        self.renderers
            .insert(element_name.into(), Box::new(renderer));
        self
    }

    /// Renderer used for element names without a registration.
    pub fn with_fallback(mut self, renderer: impl FieldRenderer<Output = O> + 'static) -> Self {
        self.fallback = Some(Box::new(renderer));
        self
    }

    fn lookup(&self, element_name: &str) -> Option<&BoxedRenderer<O>> {
        self.renderers
            .get(element_name)
            .or(self.fallback.as_ref())
    }

    /// Render one field.
    ///
    /// Returns `None` for fields that are hidden, have `visible: false`, or
    /// have no `elementName`. Disabled fields render read-only.
    pub fn render_field(&self, field: &Field, mode: RenderMode) -> Option<RenderedField<O>> {
        if !is_shown(field) {
            return None;
        }
        let element_name = field.element_name.as_deref().filter(|n| !n.is_empty())?;

        let mode = if field.disabled {
            RenderMode::ReadOnly
        } else {
            mode
        };

        Some(match self.lookup(element_name) {
            Some(renderer) => RenderedField::Widget {
                id: field.id.clone(),
                span: span(field),
                output: renderer.render(field, mode),
            },
            None => RenderedField::Undefined {
                id: field.id.clone(),
                element_name: element_name.to_string(),
            },
        })
    }

    /// Render the shown fields of a step, in order.
    pub fn render_step(&self, step: &Step, mode: RenderMode) -> Vec<RenderedField<O>> {
        step.fields
            .iter()
            .filter_map(|field| self.render_field(field, mode))
            .collect()
    }
}

fn is_shown(field: &Field) -> bool {
    !field.hidden && field.attribute("visible") != Some(&Value::Bool(false))
}

fn span(field: &Field) -> u8 {
    match field.attribute("size") {
        Some(size) => {
            let columns = to_number(size);
            if columns.is_finite() && columns >= 1.0 {
                (columns.min(GRID_COLUMNS as f64)) as u8
            } else {
                DEFAULT_SPAN
            }
        }
        None => DEFAULT_SPAN,
    }
}
