//! Caller-owned evaluation state.

use std::collections::HashMap;

use nalgebra::DVector;

use mbd_types::{ContactResults, PlantError, Result};

use crate::engine::GeometryQuery;

/// Index of a plant input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPortIndex(pub(crate) usize);

/// Index of a plant output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputPortIndex(pub(crate) usize);

/// All per-evaluation state of one plant: the state vector `[q; v]`, fixed
/// input port values, the geometry-query handle, and the staging buffers the
/// discrete update writes (contact results and generalized contact forces).
///
/// A context is created by
/// [`MultibodyPlant::create_default_context`](crate::MultibodyPlant::create_default_context)
/// and owned by the caller. The plant holds no per-context state, so many
/// contexts can be evaluated against one plant concurrently.
pub struct PlantContext {
    pub(crate) is_discrete: bool,
    pub(crate) nq: usize,
    pub(crate) nv: usize,
    pub(crate) state: DVector<f64>,
    pub(crate) input_values: HashMap<InputPortIndex, DVector<f64>>,
    pub(crate) geometry_query: Option<Box<dyn GeometryQuery>>,
    pub(crate) contact_results: ContactResults,
    pub(crate) generalized_contact_forces: DVector<f64>,
}

impl PlantContext {
    pub(crate) fn new(is_discrete: bool, nq: usize, nv: usize, state: DVector<f64>) -> Self {
        Self {
            is_discrete,
            nq,
            nv,
            state,
            input_values: HashMap::new(),
            geometry_query: None,
            contact_results: ContactResults::new(),
            generalized_contact_forces: DVector::zeros(nv),
        }
    }

    /// Whether this context holds discrete state.
    #[must_use]
    pub fn is_discrete(&self) -> bool {
        self.is_discrete
    }

    /// The full state `[q; v]`.
    #[must_use]
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Replace the full state `[q; v]`.
    pub fn set_state(&mut self, state: DVector<f64>) -> Result<()> {
        if state.len() != self.nq + self.nv {
            return Err(PlantError::invalid_argument(format!(
                "state has length {}, expected {}",
                state.len(),
                self.nq + self.nv
            )));
        }
        self.state = state;
        Ok(())
    }

    /// The position coordinates `q`.
    #[must_use]
    pub fn positions(&self) -> DVector<f64> {
        self.state.rows(0, self.nq).clone_owned()
    }

    /// Replace the position coordinates `q`.
    pub fn set_positions(&mut self, q: &DVector<f64>) -> Result<()> {
        if q.len() != self.nq {
            return Err(PlantError::invalid_argument(format!(
                "q has length {}, expected {}",
                q.len(),
                self.nq
            )));
        }
        self.state.rows_mut(0, self.nq).copy_from(q);
        Ok(())
    }

    /// The generalized velocities `v`.
    #[must_use]
    pub fn velocities(&self) -> DVector<f64> {
        self.state.rows(self.nq, self.nv).clone_owned()
    }

    /// Replace the generalized velocities `v`.
    pub fn set_velocities(&mut self, v: &DVector<f64>) -> Result<()> {
        if v.len() != self.nv {
            return Err(PlantError::invalid_argument(format!(
                "v has length {}, expected {}",
                v.len(),
                self.nv
            )));
        }
        self.state.rows_mut(self.nq, self.nv).copy_from(v);
        Ok(())
    }

    /// Fix a vector input port to a value.
    pub fn fix_input(&mut self, port: InputPortIndex, value: DVector<f64>) {
        self.input_values.insert(port, value);
    }

    /// Connect the geometry-query input.
    pub fn connect_geometry_query(&mut self, query: Box<dyn GeometryQuery>) {
        self.geometry_query = Some(query);
    }

    /// Contact results staged by the last discrete update.
    #[must_use]
    pub fn contact_results(&self) -> &ContactResults {
        &self.contact_results
    }

    /// Generalized contact forces staged by the last discrete update.
    #[must_use]
    pub fn generalized_contact_forces(&self) -> &DVector<f64> {
        &self.generalized_contact_forces
    }
}

impl std::fmt::Debug for PlantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantContext")
            .field("is_discrete", &self.is_discrete)
            .field("nq", &self.nq)
            .field("nv", &self.nv)
            .field("state", &self.state)
            .field("connected_inputs", &self.input_values.len())
            .field("has_geometry_query", &self.geometry_query.is_some())
            .finish_non_exhaustive()
    }
}
