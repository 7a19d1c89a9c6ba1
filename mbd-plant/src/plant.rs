//! The plant: lifecycle, geometry registry, ports, and the two time
//! stepping modes.

use std::collections::{BTreeMap, HashMap};

use nalgebra::{DVector, Isometry3, Matrix3, Vector3};
use tracing::debug;

use mbd_contact::{ImplicitStribeckSolver, PenaltyParameters, ProblemData, SolverSolution,
    StribeckModel};
use mbd_tree::{JointKind, MassProperties, MultibodyTree};
use mbd_types::{
    ActuatorIndex, BodyIndex, ContactInfo, ContactResults, CoulombFriction, EngineId, FrameId,
    GeometryFrame, GeometryId, GeometryInstance, GeometrySet, JointIndex, ModelInstanceIndex,
    MultibodyForces, PlantError, PointPair, Result, Shape, SourceId,
};

use crate::context::{InputPortIndex, OutputPortIndex, PlantContext};
use crate::engine::{FramePoseVector, GeometryEngine};

/// Default penetration allowance installed at finalize when unset (m).
const DEFAULT_PENETRATION_ALLOWANCE: f64 = 1e-3;
/// Default stiction tolerance installed at finalize when unset (m/s).
const DEFAULT_STICTION_TOLERANCE: f64 = 1e-3;
/// Gravity magnitude assumed by the penalty heuristic when no field is
/// configured (m/s²).
const DEFAULT_GRAVITY_MAGNITUDE: f64 = 9.81;

/// A rigid multibody dynamics plant. See the crate docs for an overview.
pub struct MultibodyPlant {
    time_step: f64,
    tree: MultibodyTree,
    finalized: bool,

    // Geometry registry. The engine identity is only held between source
    // registration and finalize; afterwards the link is erased.
    source_id: Option<SourceId>,
    registered_engine: Option<EngineId>,
    visual_geometries: Vec<Vec<GeometryId>>,
    collision_geometries: Vec<Vec<GeometryId>>,
    geometry_id_to_body_index: HashMap<GeometryId, BodyIndex>,
    geometry_id_to_visual_index: HashMap<GeometryId, usize>,
    geometry_id_to_collision_index: HashMap<GeometryId, usize>,
    default_coulomb_friction: Vec<CoulombFriction>,
    body_index_to_frame_id: BTreeMap<BodyIndex, FrameId>,

    // Contact parameters and the discrete solver.
    penalty_parameters: Option<PenaltyParameters>,
    stribeck: Option<StribeckModel>,
    contact_solver: Option<ImplicitStribeckSolver>,

    // Port surface, assigned at finalize.
    num_input_ports: usize,
    num_output_ports: usize,
    instance_actuation_ports: Vec<Option<InputPortIndex>>,
    geometry_query_port: Option<InputPortIndex>,
    actuated_instance: Option<ModelInstanceIndex>,
    state_output_port: Option<OutputPortIndex>,
    instance_state_output_ports: Vec<Option<OutputPortIndex>>,
    instance_generalized_contact_forces_output_ports: Vec<Option<OutputPortIndex>>,
    contact_results_port: Option<OutputPortIndex>,
    geometry_pose_port: Option<OutputPortIndex>,
}

impl MultibodyPlant {
    /// Create a plant.
    ///
    /// `time_step == 0` selects continuous mode; a positive value selects
    /// discrete periodic updates of that period.
    pub fn new(time_step: f64) -> Result<Self> {
        if !time_step.is_finite() || time_step < 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "time_step must be finite and non-negative, got {time_step}"
            )));
        }
        Ok(Self {
            time_step,
            tree: MultibodyTree::new(),
            finalized: false,
            source_id: None,
            registered_engine: None,
            // Entries for the world body.
            visual_geometries: vec![Vec::new()],
            collision_geometries: vec![Vec::new()],
            geometry_id_to_body_index: HashMap::new(),
            geometry_id_to_visual_index: HashMap::new(),
            geometry_id_to_collision_index: HashMap::new(),
            default_coulomb_friction: Vec::new(),
            body_index_to_frame_id: BTreeMap::new(),
            penalty_parameters: None,
            stribeck: None,
            contact_solver: None,
            num_input_ports: 0,
            num_output_ports: 0,
            instance_actuation_ports: Vec::new(),
            geometry_query_port: None,
            actuated_instance: None,
            state_output_port: None,
            instance_state_output_ports: Vec::new(),
            instance_generalized_contact_forces_output_ports: Vec::new(),
            contact_results_port: None,
            geometry_pose_port: None,
        })
    }

    fn throw_if_finalized(&self, method: &'static str) -> Result<()> {
        if self.finalized {
            return Err(PlantError::PostFinalizeMutation { method });
        }
        Ok(())
    }

    fn throw_if_not_finalized(&self, method: &'static str) -> Result<()> {
        if !self.finalized {
            return Err(PlantError::PreFinalizeUse { method });
        }
        Ok(())
    }

    // ===================== Introspection =====================

    /// The discrete period, zero for continuous plants.
    #[must_use]
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Whether this plant advances by discrete periodic updates.
    #[must_use]
    pub fn is_discrete(&self) -> bool {
        self.time_step > 0.0
    }

    /// Whether `finalize()` has been called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The underlying tree.
    #[must_use]
    pub fn tree(&self) -> &MultibodyTree {
        &self.tree
    }

    /// Number of bodies, world included.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.tree.num_bodies()
    }

    /// Number of registered collision geometries.
    #[must_use]
    pub fn num_collision_geometries(&self) -> usize {
        self.geometry_id_to_collision_index.len()
    }

    /// The penalty parameters, once derived.
    #[must_use]
    pub fn penalty_parameters(&self) -> Option<&PenaltyParameters> {
        self.penalty_parameters.as_ref()
    }

    /// The Stribeck model, once the stiction tolerance is set.
    #[must_use]
    pub(crate) fn stribeck_model(&self) -> Option<&StribeckModel> {
        self.stribeck.as_ref()
    }

    /// The configured stiction tolerance, if set.
    #[must_use]
    pub fn stiction_tolerance(&self) -> Option<f64> {
        self.stribeck.as_ref().map(StribeckModel::stiction_tolerance)
    }

    // ===================== Model construction =====================

    /// Add a model instance.
    pub fn add_model_instance(&mut self, name: impl Into<String>) -> Result<ModelInstanceIndex> {
        self.throw_if_finalized("add_model_instance")?;
        self.tree.add_model_instance(name)
    }

    /// Add a rigid body.
    pub fn add_rigid_body(
        &mut self,
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        mass_properties: MassProperties,
    ) -> Result<BodyIndex> {
        self.throw_if_finalized("add_rigid_body")?;
        let body = self.tree.add_rigid_body(name, instance, mass_properties)?;
        self.visual_geometries.push(Vec::new());
        self.collision_geometries.push(Vec::new());
        debug_assert_eq!(self.num_bodies(), self.visual_geometries.len());
        debug_assert_eq!(self.num_bodies(), self.collision_geometries.len());
        Ok(body)
    }

    /// Add a joint.
    #[allow(clippy::too_many_arguments)]
    pub fn add_joint(
        &mut self,
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        parent: BodyIndex,
        child: BodyIndex,
        kind: JointKind,
        pose_in_parent: Isometry3<f64>,
        damping: f64,
    ) -> Result<JointIndex> {
        self.throw_if_finalized("add_joint")?;
        self.tree
            .add_joint(name, instance, parent, child, kind, pose_in_parent, damping)
    }

    /// Add an actuator on a single-dof joint.
    pub fn add_joint_actuator(
        &mut self,
        name: impl Into<String>,
        joint: JointIndex,
    ) -> Result<ActuatorIndex> {
        self.throw_if_finalized("add_joint_actuator")?;
        self.tree.add_joint_actuator(name, joint)
    }

    /// Install a uniform gravity field.
    pub fn set_uniform_gravity(&mut self, gravity: Vector3<f64>) -> Result<()> {
        self.throw_if_finalized("set_uniform_gravity")?;
        self.tree.set_uniform_gravity(gravity)
    }

    // ===================== Geometry registration =====================

    /// Register this plant as a geometry source of `engine`.
    ///
    /// All later geometry registrations, and `finalize()`, must be handed
    /// the same engine.
    pub fn register_as_source(&mut self, engine: &mut dyn GeometryEngine) -> Result<SourceId> {
        self.throw_if_finalized("register_as_source")?;
        if self.source_id.is_some() {
            return Err(PlantError::DuplicateSourceRegistration);
        }
        let source = engine.register_source();
        self.source_id = Some(source);
        self.registered_engine = Some(engine.engine_id());
        Ok(source)
    }

    /// Whether a geometry source has been registered.
    #[must_use]
    pub fn geometry_source_is_registered(&self) -> bool {
        self.source_id.is_some()
    }

    fn check_registration_engine(&self, engine: &dyn GeometryEngine) -> Result<SourceId> {
        let source = self.source_id.ok_or_else(|| {
            PlantError::invalid_argument(
                "this plant is not registered as a geometry source; \
                 call register_as_source() first"
                    .to_string(),
            )
        })?;
        if self.registered_engine != Some(engine.engine_id()) {
            return Err(PlantError::GeometryEngineMismatch);
        }
        Ok(source)
    }

    /// Register visual (non-colliding) geometry on a body.
    pub fn register_visual_geometry(
        &mut self,
        body: BodyIndex,
        pose: Isometry3<f64>,
        shape: Shape,
        name: impl Into<String>,
        engine: &mut dyn GeometryEngine,
    ) -> Result<GeometryId> {
        self.throw_if_finalized("register_visual_geometry")?;
        let id = self.register_geometry(body, pose, shape, name, engine)?;
        let visual_index = self.geometry_id_to_visual_index.len();
        self.geometry_id_to_visual_index.insert(id, visual_index);
        self.visual_geometries[body.raw()].push(id);
        Ok(id)
    }

    /// Register collision geometry on a body, with its surface friction.
    pub fn register_collision_geometry(
        &mut self,
        body: BodyIndex,
        pose: Isometry3<f64>,
        shape: Shape,
        name: impl Into<String>,
        friction: CoulombFriction,
        engine: &mut dyn GeometryEngine,
    ) -> Result<GeometryId> {
        self.throw_if_finalized("register_collision_geometry")?;
        let id = self.register_geometry(body, pose, shape, name, engine)?;
        let collision_index = self.geometry_id_to_collision_index.len();
        self.geometry_id_to_collision_index.insert(id, collision_index);
        debug_assert_eq!(self.default_coulomb_friction.len(), collision_index);
        self.default_coulomb_friction.push(friction);
        self.collision_geometries[body.raw()].push(id);
        Ok(id)
    }

    /// Shared registration: anchored for the world, frame-attached
    /// otherwise (registering the body's frame on first use).
    fn register_geometry(
        &mut self,
        body: BodyIndex,
        pose: Isometry3<f64>,
        shape: Shape,
        name: impl Into<String>,
        engine: &mut dyn GeometryEngine,
    ) -> Result<GeometryId> {
        let source = self.check_registration_engine(engine)?;
        if body.raw() >= self.num_bodies() {
            return Err(PlantError::invalid_argument(format!(
                "invalid body index {body}"
            )));
        }
        let instance = GeometryInstance::new(pose, shape, name);
        let id = if body.is_world() {
            engine.register_anchored_geometry(source, instance)?
        } else {
            let frame_id = match self.body_index_to_frame_id.get(&body) {
                Some(frame_id) => *frame_id,
                None => {
                    let frame_id = engine.register_frame(
                        source,
                        GeometryFrame::new(self.tree.get_body(body).name()),
                    )?;
                    self.body_index_to_frame_id.insert(body, frame_id);
                    frame_id
                }
            };
            engine.register_geometry(source, frame_id, instance)?
        };
        self.geometry_id_to_body_index.insert(id, body);
        Ok(id)
    }

    /// Visual geometries registered on a body.
    #[must_use]
    pub fn get_visual_geometries_for_body(&self, body: BodyIndex) -> &[GeometryId] {
        &self.visual_geometries[body.raw()]
    }

    /// Collision geometries registered on a body.
    #[must_use]
    pub fn get_collision_geometries_for_body(&self, body: BodyIndex) -> &[GeometryId] {
        &self.collision_geometries[body.raw()]
    }

    /// The engine frame registered for a body, if any.
    #[must_use]
    pub fn get_body_frame_id(&self, body: BodyIndex) -> Option<FrameId> {
        self.body_index_to_frame_id.get(&body).copied()
    }

    /// The body a geometry is registered against.
    pub fn body_of_geometry(&self, id: GeometryId) -> Result<BodyIndex> {
        self.geometry_id_to_body_index.get(&id).copied().ok_or_else(|| {
            PlantError::invalid_argument(format!("geometry {id} is not registered with this plant"))
        })
    }

    /// Build a [`GeometrySet`] covering the given bodies' registered
    /// geometry (their frames; for the world its anchored collision
    /// geometry).
    pub fn collect_registered_geometries(&self, bodies: &[BodyIndex]) -> Result<GeometrySet> {
        self.throw_if_not_finalized("collect_registered_geometries")?;
        if !self.geometry_source_is_registered() {
            return Err(PlantError::invalid_argument(
                "this plant is not registered as a geometry source".to_string(),
            ));
        }
        let mut set = GeometrySet::new();
        for body in bodies {
            if let Some(frame_id) = self.get_body_frame_id(*body) {
                set.add_frame(frame_id);
            } else if body.is_world() {
                set.add_geometries(self.collision_geometries[0].iter().copied());
            }
        }
        Ok(set)
    }

    // ===================== Finalize =====================

    /// Freeze the plant: finalize the tree, install collision filters,
    /// declare state and ports, and size the contact machinery.
    ///
    /// If the plant registered a geometry source, `engine` must be that
    /// same engine; otherwise it may be `None`.
    pub fn finalize(&mut self, engine: Option<&mut dyn GeometryEngine>) -> Result<()> {
        self.throw_if_finalized("finalize")?;
        self.tree.finalize()?;
        self.install_collision_filters(engine)?;
        self.declare_state_and_ports();
        if self.geometry_source_is_registered() {
            self.declare_scene_graph_ports();
        }
        // The engine link must not outlive finalize.
        self.registered_engine = None;
        self.finalized = true;

        if self.num_collision_geometries() > 0 {
            if self.penalty_parameters.is_none() {
                self.set_penetration_allowance(DEFAULT_PENETRATION_ALLOWANCE)?;
            }
            if self.stribeck.is_none() {
                self.set_stiction_tolerance(DEFAULT_STICTION_TOLERANCE)?;
            }
        }
        if self.is_discrete() {
            let mut solver = ImplicitStribeckSolver::new(self.tree.num_velocities());
            if let Some(v_stiction) = self.stiction_tolerance() {
                solver.set_stiction_tolerance(v_stiction)?;
            }
            self.contact_solver = Some(solver);
        }
        debug!(
            time_step = self.time_step,
            nq = self.tree.num_positions(),
            nv = self.tree.num_velocities(),
            num_collision_geometries = self.num_collision_geometries(),
            "plant finalized"
        );
        Ok(())
    }

    /// Install the collision filters: no visual self-collisions, no
    /// visual↔collision pairs, and no collisions between bodies joined by a
    /// joint unless one of them is the world.
    fn install_collision_filters(
        &self,
        engine: Option<&mut dyn GeometryEngine>,
    ) -> Result<()> {
        if !self.geometry_source_is_registered() {
            return Ok(());
        }
        let engine = engine.ok_or(PlantError::GeometryEngineMissing)?;
        if self.registered_engine != Some(engine.engine_id()) {
            return Err(PlantError::GeometryEngineMismatch);
        }

        // Adjacency is implied by the existence of a joint between bodies.
        // Joints to the world are skipped: filtering a body against all
        // anchored geometry would be far too broad.
        for joint in self.tree.joints() {
            if joint.parent_body().is_world() {
                continue;
            }
            let child_frame = self.get_body_frame_id(joint.child_body());
            let parent_frame = self.get_body_frame_id(joint.parent_body());
            if let (Some(child_frame), Some(parent_frame)) = (child_frame, parent_frame) {
                engine.exclude_collisions_between(
                    &GeometrySet::from_frame(child_frame),
                    &GeometrySet::from_frame(parent_frame),
                );
            }
        }

        let mut visual = GeometrySet::new();
        for body_geometries in &self.visual_geometries {
            visual.add_geometries(body_geometries.iter().copied());
        }
        let mut collision = GeometrySet::new();
        for body_geometries in &self.collision_geometries {
            collision.add_geometries(body_geometries.iter().copied());
        }
        engine.exclude_collisions_within(&visual);
        engine.exclude_collisions_between(&visual, &collision);
        Ok(())
    }

    fn next_input_port(&mut self) -> InputPortIndex {
        let port = InputPortIndex(self.num_input_ports);
        self.num_input_ports += 1;
        port
    }

    fn next_output_port(&mut self) -> OutputPortIndex {
        let port = OutputPortIndex(self.num_output_ports);
        self.num_output_ports += 1;
        port
    }

    fn declare_state_and_ports(&mut self) {
        let num_instances = self.tree.num_model_instances();

        // Per-instance actuation inputs.
        self.instance_actuation_ports = vec![None; num_instances];
        let mut num_actuated_instances = 0;
        let mut last_actuated_instance = None;
        for index in 0..num_instances {
            let instance = ModelInstanceIndex::new(index);
            let dofs = self
                .tree
                .num_instance_actuated_dofs(instance)
                .unwrap_or(0);
            if dofs == 0 {
                continue;
            }
            num_actuated_instances += 1;
            last_actuated_instance = Some(instance);
            self.instance_actuation_ports[index] = Some(self.next_input_port());
        }
        if num_actuated_instances == 1 {
            self.actuated_instance = last_actuated_instance;
        }

        // Whole-plant state output.
        self.state_output_port = Some(self.next_output_port());

        // Per-instance state outputs.
        self.instance_state_output_ports = vec![None; num_instances];
        for index in 0..num_instances {
            let instance = ModelInstanceIndex::new(index);
            if self.tree.num_instance_states(instance).unwrap_or(0) == 0 {
                continue;
            }
            self.instance_state_output_ports[index] = Some(self.next_output_port());
        }

        // Per-instance generalized contact force outputs.
        self.instance_generalized_contact_forces_output_ports = vec![None; num_instances];
        for index in 0..num_instances {
            let instance = ModelInstanceIndex::new(index);
            if self.tree.num_instance_velocities(instance).unwrap_or(0) == 0 {
                continue;
            }
            self.instance_generalized_contact_forces_output_ports[index] =
                Some(self.next_output_port());
        }

        self.contact_results_port = Some(self.next_output_port());
    }

    fn declare_scene_graph_ports(&mut self) {
        self.geometry_query_port = Some(self.next_input_port());
        self.geometry_pose_port = Some(self.next_output_port());
    }

    // ===================== Contact parameters =====================

    /// Derive the penalty parameters from a penetration allowance (m).
    ///
    /// Auto-invoked at finalize with a 1 mm default when collision geometry
    /// exists and no explicit call was made; explicit calls (post-finalize)
    /// recompute the parameters.
    pub fn set_penetration_allowance(&mut self, penetration_allowance: f64) -> Result<()> {
        self.throw_if_not_finalized("set_penetration_allowance")?;
        let gravity = self
            .tree
            .gravity_field()
            .map_or(DEFAULT_GRAVITY_MAGNITUDE, Vector3::norm);
        // Deliberately conservative: the maximum mass over every body in
        // the model, fixed bases included.
        let mass = self.tree.max_default_mass();
        let params =
            PenaltyParameters::from_penetration_allowance(penetration_allowance, mass, gravity)?;
        debug!(
            penetration_allowance,
            stiffness = params.stiffness,
            damping = params.damping,
            time_scale = params.time_scale,
            "penalty contact parameters derived"
        );
        self.penalty_parameters = Some(params);
        Ok(())
    }

    /// Set the stiction tolerance `v*` (m/s) of the Stribeck model and, for
    /// discrete plants, of the implicit solver.
    pub fn set_stiction_tolerance(&mut self, stiction_tolerance: f64) -> Result<()> {
        self.stribeck = Some(StribeckModel::new(stiction_tolerance)?);
        if let Some(solver) = self.contact_solver.as_mut() {
            solver.set_stiction_tolerance(stiction_tolerance)?;
        }
        Ok(())
    }

    // ===================== Context and ports =====================

    /// Create a context at the default state (all joints at zero).
    pub fn create_default_context(&self) -> Result<PlantContext> {
        self.throw_if_not_finalized("create_default_context")?;
        let nq = self.tree.num_positions();
        let nv = self.tree.num_velocities();
        let mut state = DVector::zeros(nq + nv);
        state.rows_mut(0, nq).copy_from(&self.tree.default_positions());
        Ok(PlantContext::new(self.is_discrete(), nq, nv, state))
    }

    /// The actuation input port, available when exactly one model instance
    /// is actuated.
    pub fn get_actuation_input_port(&self) -> Result<InputPortIndex> {
        self.throw_if_not_finalized("get_actuation_input_port")?;
        if self.tree.num_actuators() == 0 {
            return Err(PlantError::invalid_argument(
                "this plant has no actuators".to_string(),
            ));
        }
        let instance = self.actuated_instance.ok_or_else(|| {
            PlantError::invalid_argument(
                "multiple model instances are actuated; \
                 use get_actuation_input_port_for_instance()"
                    .to_string(),
            )
        })?;
        self.get_actuation_input_port_for_instance(instance)
    }

    /// The actuation input port of one model instance.
    pub fn get_actuation_input_port_for_instance(
        &self,
        instance: ModelInstanceIndex,
    ) -> Result<InputPortIndex> {
        self.throw_if_not_finalized("get_actuation_input_port_for_instance")?;
        if self.tree.num_instance_actuated_dofs(instance)? == 0 {
            return Err(PlantError::invalid_argument(format!(
                "model instance {instance} has no actuated degrees of freedom"
            )));
        }
        self.instance_actuation_ports[instance.raw()]
            .ok_or_else(|| PlantError::invalid_argument(format!("no actuation port for {instance}")))
    }

    /// The geometry-query input port.
    pub fn get_geometry_query_input_port(&self) -> Result<InputPortIndex> {
        self.throw_if_not_finalized("get_geometry_query_input_port")?;
        self.geometry_query_port.ok_or_else(|| {
            PlantError::invalid_argument(
                "this plant is not registered as a geometry source".to_string(),
            )
        })
    }

    /// The whole-plant state output port.
    pub fn get_state_output_port(&self) -> Result<OutputPortIndex> {
        self.throw_if_not_finalized("get_state_output_port")?;
        self.state_output_port
            .ok_or_else(|| PlantError::invalid_argument("state port undeclared".to_string()))
    }

    /// The state output port of one model instance.
    pub fn get_state_output_port_for_instance(
        &self,
        instance: ModelInstanceIndex,
    ) -> Result<OutputPortIndex> {
        self.throw_if_not_finalized("get_state_output_port_for_instance")?;
        if self.tree.num_instance_states(instance)? == 0 {
            return Err(PlantError::invalid_argument(format!(
                "model instance {instance} has no state"
            )));
        }
        self.instance_state_output_ports[instance.raw()]
            .ok_or_else(|| PlantError::invalid_argument(format!("no state port for {instance}")))
    }

    /// The generalized contact forces output port of one model instance
    /// (discrete mode only).
    pub fn get_generalized_contact_forces_output_port(
        &self,
        instance: ModelInstanceIndex,
    ) -> Result<OutputPortIndex> {
        self.throw_if_not_finalized("get_generalized_contact_forces_output_port")?;
        if !self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "generalized contact forces are only reported by discrete plants".to_string(),
            ));
        }
        if self.tree.num_instance_velocities(instance)? == 0 {
            return Err(PlantError::invalid_argument(format!(
                "model instance {instance} has no velocities"
            )));
        }
        self.instance_generalized_contact_forces_output_ports[instance.raw()]
            .ok_or_else(|| PlantError::invalid_argument(format!("no contact force port for {instance}")))
    }

    /// The contact results output port (discrete mode only).
    pub fn get_contact_results_output_port(&self) -> Result<OutputPortIndex> {
        self.throw_if_not_finalized("get_contact_results_output_port")?;
        if !self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "contact results are only reported by discrete plants".to_string(),
            ));
        }
        self.contact_results_port
            .ok_or_else(|| PlantError::invalid_argument("contact results port undeclared".to_string()))
    }

    /// The geometry-poses output port.
    pub fn get_geometry_poses_output_port(&self) -> Result<OutputPortIndex> {
        self.throw_if_not_finalized("get_geometry_poses_output_port")?;
        self.geometry_pose_port.ok_or_else(|| {
            PlantError::invalid_argument(
                "this plant is not registered as a geometry source".to_string(),
            )
        })
    }

    // ===================== Output evaluation =====================

    /// Evaluate the whole-plant state output `[q; v]`.
    pub fn calc_state_output(&self, context: &PlantContext) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("calc_state_output")?;
        Ok(context.state.clone())
    }

    /// Evaluate one instance's state output `[q_i; v_i]`.
    pub fn calc_state_output_for_instance(
        &self,
        instance: ModelInstanceIndex,
        context: &PlantContext,
    ) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("calc_state_output_for_instance")?;
        let q_instance = self
            .tree
            .get_positions_from_array(instance, &context.positions())?;
        let v_instance = self
            .tree
            .get_velocities_from_array(instance, &context.velocities())?;
        let mut out = DVector::zeros(q_instance.len() + v_instance.len());
        out.rows_mut(0, q_instance.len()).copy_from(&q_instance);
        out.rows_mut(q_instance.len(), v_instance.len())
            .copy_from(&v_instance);
        Ok(out)
    }

    /// Evaluate one instance's generalized contact forces (discrete only).
    pub fn calc_generalized_contact_forces_output(
        &self,
        instance: ModelInstanceIndex,
        context: &PlantContext,
    ) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("calc_generalized_contact_forces_output")?;
        if !self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "generalized contact forces are only reported by discrete plants".to_string(),
            ));
        }
        // Generalized forces share the velocity ordering.
        self.tree
            .get_velocities_from_array(instance, &context.generalized_contact_forces)
    }

    /// Evaluate the contact results staged by the last discrete update.
    pub fn calc_contact_results_output<'c>(
        &self,
        context: &'c PlantContext,
    ) -> Result<&'c ContactResults> {
        self.throw_if_not_finalized("calc_contact_results_output")?;
        if !self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "contact results are only reported by discrete plants".to_string(),
            ));
        }
        Ok(&context.contact_results)
    }

    /// Evaluate the geometry poses output: `X_WB` for every body with a
    /// registered frame.
    pub fn calc_frame_poses_output(&self, context: &PlantContext) -> Result<FramePoseVector> {
        self.throw_if_not_finalized("calc_frame_poses_output")?;
        let source_id = self.source_id.ok_or_else(|| {
            PlantError::invalid_argument(
                "this plant is not registered as a geometry source".to_string(),
            )
        })?;
        let pc = self.tree.calc_position_kinematics_cache(&context.positions())?;
        let poses = self
            .body_index_to_frame_id
            .iter()
            .map(|(body, frame)| (*frame, *pc.pose(*body)))
            .collect();
        Ok(FramePoseVector::new(source_id, poses))
    }

    // ===================== Actuation =====================

    /// Gather every actuated instance's input into one vector indexed by
    /// actuator.
    fn assemble_actuation_input(&self, context: &PlantContext) -> Result<DVector<f64>> {
        let mut actuation = DVector::zeros(self.tree.num_actuated_dofs());
        for index in 0..self.tree.num_model_instances() {
            let instance = ModelInstanceIndex::new(index);
            let instance_dofs = self.tree.num_instance_actuated_dofs(instance)?;
            if instance_dofs == 0 {
                continue;
            }
            let port = self.instance_actuation_ports[index].ok_or_else(|| {
                PlantError::invalid_argument(format!("no actuation port for {instance}"))
            })?;
            let value = context.input_values.get(&port).ok_or_else(|| {
                PlantError::InputPortNotConnected {
                    port: format!("actuation[{instance}]"),
                }
            })?;
            if value.len() != instance_dofs {
                return Err(PlantError::invalid_argument(format!(
                    "actuation input for {instance} has length {}, expected {instance_dofs}",
                    value.len()
                )));
            }
            let mut within_instance = 0;
            for (actuator_index, actuator) in self.tree.actuators().iter().enumerate() {
                if actuator.model_instance() != instance {
                    continue;
                }
                actuation[actuator_index] = value[within_instance];
                within_instance += 1;
            }
        }
        Ok(actuation)
    }

    /// Apply the assembled actuation onto each actuator's joint dof.
    fn add_joint_actuation_forces(
        &self,
        actuation: &DVector<f64>,
        forces: &mut MultibodyForces,
    ) {
        let generalized = forces.mutable_generalized_forces();
        for (actuator_index, actuator) in self.tree.actuators().iter().enumerate() {
            let joint = self.tree.get_joint(actuator.joint());
            generalized[joint.velocity_start()] += actuation[actuator_index];
        }
    }

    // ===================== Contact queries =====================

    /// Current penetrations from the geometry query connected to the
    /// context. Plants without collision geometry never touch the port.
    pub(crate) fn calc_point_pair_penetrations(
        &self,
        context: &PlantContext,
    ) -> Result<Vec<PointPair>> {
        if self.num_collision_geometries() == 0 {
            return Ok(Vec::new());
        }
        let query = context
            .geometry_query
            .as_ref()
            .ok_or(PlantError::QueryPortDisconnected)?;
        Ok(query.compute_point_pair_penetration())
    }

    /// Combined friction of each point pair's two collision geometries.
    pub(crate) fn calc_combined_friction_coefficients(
        &self,
        point_pairs: &[PointPair],
    ) -> Result<Vec<CoulombFriction>> {
        point_pairs
            .iter()
            .map(|pair| {
                let friction_a = self.collision_friction(pair.id_a)?;
                let friction_b = self.collision_friction(pair.id_b)?;
                Ok(friction_a.combine_with(&friction_b))
            })
            .collect()
    }

    fn collision_friction(&self, id: GeometryId) -> Result<&CoulombFriction> {
        let index = self.geometry_id_to_collision_index.get(&id).ok_or_else(|| {
            PlantError::invalid_argument(format!(
                "geometry {id} is not registered as collision geometry"
            ))
        })?;
        Ok(&self.default_coulomb_friction[*index])
    }

    // ===================== Continuous dynamics =====================

    /// Continuous-mode derivatives `ẋ = [q̇; v̇]`.
    pub fn calc_time_derivatives(&self, context: &PlantContext) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("calc_time_derivatives")?;
        if self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "a discrete plant has no continuous derivatives".to_string(),
            ));
        }
        let q = context.positions();
        let v = context.velocities();
        let nv = self.tree.num_velocities();

        let pc = self.tree.calc_position_kinematics_cache(&q)?;
        let vc = self.tree.calc_velocity_kinematics_cache(&pc, &v)?;

        let mut forces = MultibodyForces::new(self.num_bodies(), nv);
        self.tree.calc_force_elements_contribution(&pc, &vc, &mut forces)?;
        if self.tree.num_actuators() > 0 {
            let actuation = self.assemble_actuation_input(context)?;
            self.add_joint_actuation_forces(&actuation, &mut forces);
        }
        self.tree.add_joint_damping_forces(&v, &mut forces)?;

        let mass_matrix = self.tree.calc_mass_matrix_via_inverse_dynamics(&pc)?;

        if self.num_collision_geometries() > 0 {
            let point_pairs = self.calc_point_pair_penetrations(context)?;
            self.calc_and_add_contact_forces_by_penalty_method(
                &pc,
                &vc,
                &point_pairs,
                forces.mutable_body_forces(),
            )?;
        }

        // With v̇ = 0 this yields τ̂ = C(q,v)·v − τ_app − Σ Jᵀ F_app.
        let tau_hat =
            self.tree
                .calc_inverse_dynamics(&pc, &vc, &v, &DVector::zeros(nv), &forces)?;

        let vdot = mass_matrix
            .cholesky()
            .ok_or_else(|| {
                PlantError::invalid_argument("mass matrix is not positive definite".to_string())
            })?
            .solve(&(-tau_hat));

        let qdot = self.tree.map_velocity_to_qdot(&q, &v)?;
        let mut xdot = DVector::zeros(qdot.len() + nv);
        xdot.rows_mut(0, qdot.len()).copy_from(&qdot);
        xdot.rows_mut(qdot.len(), nv).copy_from(&vdot);
        Ok(xdot)
    }

    // ===================== Discrete dynamics =====================

    /// Advance a discrete context by one period: solve the implicit contact
    /// problem, integrate positions, and stage the contact results into the
    /// context.
    pub fn calc_discrete_variable_updates(&self, context: &mut PlantContext) -> Result<()> {
        self.throw_if_not_finalized("calc_discrete_variable_updates")?;
        if !self.is_discrete() {
            return Err(PlantError::invalid_argument(
                "a continuous plant has no discrete updates".to_string(),
            ));
        }
        let dt = self.time_step;
        let nv = self.tree.num_velocities();
        let q0 = context.positions();
        let v0 = context.velocities();

        let pc0 = self.tree.calc_position_kinematics_cache(&q0)?;
        let vc0 = self.tree.calc_velocity_kinematics_cache(&pc0, &v0)?;

        let mass_matrix = self.tree.calc_mass_matrix_via_inverse_dynamics(&pc0)?;

        let mut forces0 = MultibodyForces::new(self.num_bodies(), nv);
        self.tree
            .calc_force_elements_contribution(&pc0, &vc0, &mut forces0)?;
        if self.tree.num_actuators() > 0 {
            let actuation = self.assemble_actuation_input(context)?;
            self.add_joint_actuation_forces(&actuation, &mut forces0);
        }
        self.tree.add_joint_damping_forces(&v0, &mut forces0)?;

        // With v̇ = 0: minus_tau = C(q,v)·v − τ_app − Σ Jᵀ F_app.
        let minus_tau =
            self.tree
                .calc_inverse_dynamics(&pc0, &vc0, &v0, &DVector::zeros(nv), &forces0)?;

        let point_pairs = self.calc_point_pair_penetrations(context)?;
        let num_contacts = point_pairs.len();

        // Momentum before contact impulses.
        let p_star = &mass_matrix * &v0 - &minus_tau * dt;

        let (jn, jt, r_wc_set) = if num_contacts > 0 {
            let jn = self.calc_normal_separation_velocities_jacobian(&pc0, &point_pairs)?;
            let (jt, r_wc_set) = self.calc_tangent_velocities_jacobian(&pc0, &point_pairs)?;
            (jn, jt, r_wc_set)
        } else {
            (
                nalgebra::DMatrix::zeros(0, nv),
                nalgebra::DMatrix::zeros(0, nv),
                Vec::new(),
            )
        };

        // Dynamic friction is ignored by the time stepping scheme; the
        // solver's regularization provides the stiction distinction.
        let combined = self.calc_combined_friction_coefficients(&point_pairs)?;
        let mu = DVector::from_iterator(
            num_contacts,
            combined.iter().map(CoulombFriction::static_friction),
        );
        let phi0 = DVector::from_iterator(num_contacts, point_pairs.iter().map(|pair| pair.depth));

        let (stiffness_value, damping_value) = if num_contacts > 0 {
            let params = self.penalty_parameters.as_ref().ok_or_else(|| {
                PlantError::invalid_argument(
                    "penalty parameters are unset; call set_penetration_allowance()".to_string(),
                )
            })?;
            (params.stiffness, params.damping)
        } else {
            (0.0, 0.0)
        };
        let stiffness = DVector::from_element(num_contacts, stiffness_value);
        let damping = DVector::from_element(num_contacts, damping_value);

        let solver = self.contact_solver.as_ref().ok_or_else(|| {
            PlantError::invalid_argument("discrete plant has no contact solver".to_string())
        })?;
        let data = ProblemData::new(
            &mass_matrix,
            &jn,
            &jt,
            &p_star,
            &phi0,
            &stiffness,
            &damping,
            &mu,
        )?;
        // Non-success is fatal to the step.
        let solution = solver.solve_with_guess(dt, &data, &v0)?;

        let v_next = solution.generalized_velocities();
        let qdot_next = self.tree.map_velocity_to_qdot(&q0, v_next)?;
        let q_next = &q0 + qdot_next * dt;

        let mut state = DVector::zeros(q_next.len() + nv);
        state.rows_mut(0, q_next.len()).copy_from(&q_next);
        state.rows_mut(q_next.len(), nv).copy_from(v_next);
        context.state = state;
        context.generalized_contact_forces = solution.generalized_contact_forces().clone();
        self.calc_contact_results(&point_pairs, &r_wc_set, &solution, &mut context.contact_results)?;
        Ok(())
    }

    /// Rebuild per-contact reporting from the solver outputs.
    fn calc_contact_results(
        &self,
        point_pairs: &[PointPair],
        r_wc_set: &[Matrix3<f64>],
        solution: &SolverSolution,
        contact_results: &mut ContactResults,
    ) -> Result<()> {
        contact_results.clear();
        debug_assert_eq!(point_pairs.len(), r_wc_set.len());
        let normal_forces = solution.normal_forces();
        let friction_forces = solution.friction_forces();
        let normal_velocities = solution.normal_velocities();
        let tangential_velocities = solution.tangential_velocities();
        for (i, pair) in point_pairs.iter().enumerate() {
            let body_a = self.body_of_geometry(pair.id_a)?;
            let body_b = self.body_of_geometry(pair.id_b)?;

            // Force on B at C: tangential components in the contact frame,
            // normal along its third axis.
            let f_bc_c = Vector3::new(
                friction_forces[2 * i],
                friction_forces[2 * i + 1],
                normal_forces[i],
            );
            let f_bc_w = r_wc_set[i] * f_bc_c;

            let slip_speed = Vector3::new(
                tangential_velocities[2 * i],
                tangential_velocities[2 * i + 1],
                0.0,
            )
            .norm();

            contact_results.add_contact_info(ContactInfo {
                body_a,
                body_b,
                contact_force: f_bc_w,
                contact_point: pair.contact_point(),
                separation_velocity: normal_velocities[i],
                slip_speed,
                point_pair: pair.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_time_step_rejected() {
        assert!(MultibodyPlant::new(-1e-3).is_err());
        assert!(MultibodyPlant::new(f64::NAN).is_err());
        assert!(MultibodyPlant::new(0.0).is_ok());
        assert!(MultibodyPlant::new(1e-3).is_ok());
    }

    #[test]
    fn test_mode_selection() {
        assert!(!MultibodyPlant::new(0.0).unwrap().is_discrete());
        assert!(MultibodyPlant::new(2e-3).unwrap().is_discrete());
    }

    #[test]
    fn test_geometry_invariants_track_bodies() {
        let mut plant = MultibodyPlant::new(0.0).unwrap();
        plant
            .add_rigid_body(
                "a",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass(1.0),
            )
            .unwrap();
        plant
            .add_rigid_body(
                "b",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass(1.0),
            )
            .unwrap();
        assert_eq!(plant.num_bodies(), 3);
        assert_eq!(plant.get_visual_geometries_for_body(BodyIndex::new(2)).len(), 0);
        assert_eq!(plant.num_collision_geometries(), 0);
    }
}
