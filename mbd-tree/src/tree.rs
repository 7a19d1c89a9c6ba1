//! The tree structure: topology, finalize, kinematics, Jacobians, maps.

use nalgebra::{DMatrix, DVector, Isometry3, Point3, Quaternion, Translation3, Unit,
    UnitQuaternion, Vector3};

use mbd_types::{
    ActuatorIndex, BodyIndex, JointIndex, ModelInstanceIndex, PlantError, Result, SpatialVelocity,
};

use crate::body::{MassProperties, RigidBody};
use crate::joint::{Joint, JointActuator, JointKind};

/// World-frame body poses `X_WB`, one per body.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionKinematicsCache {
    poses: Vec<Isometry3<f64>>,
}

impl PositionKinematicsCache {
    /// Pose of a body in the world frame.
    #[must_use]
    pub fn pose(&self, body: BodyIndex) -> &Isometry3<f64> {
        &self.poses[body.raw()]
    }

    /// All poses, indexed by body.
    #[must_use]
    pub fn poses(&self) -> &[Isometry3<f64>] {
        &self.poses
    }
}

/// World-frame spatial velocities `V_WB` about each body origin.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityKinematicsCache {
    velocities: Vec<SpatialVelocity>,
}

impl VelocityKinematicsCache {
    /// A cache of zero velocities, for queries at rest.
    #[must_use]
    pub fn zeroed(num_bodies: usize) -> Self {
        Self {
            velocities: vec![SpatialVelocity::zero(); num_bodies],
        }
    }

    /// Spatial velocity of a body about its origin, expressed in world.
    #[must_use]
    pub fn velocity(&self, body: BodyIndex) -> &SpatialVelocity {
        &self.velocities[body.raw()]
    }
}

/// An articulated rigid body tree rooted at the world.
///
/// See the crate docs for conventions. All query methods require
/// [`finalize`](Self::finalize) to have been called; all mutating methods
/// require that it has not.
#[derive(Debug, Clone)]
pub struct MultibodyTree {
    bodies: Vec<RigidBody>,
    joints: Vec<Joint>,
    actuators: Vec<JointActuator>,
    instance_names: Vec<String>,
    gravity: Option<Vector3<f64>>,
    finalized: bool,
    nq: usize,
    nv: usize,
    body_inboard_joint: Vec<Option<JointIndex>>,
}

impl Default for MultibodyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MultibodyTree {
    /// Create a tree holding only the world body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: vec![RigidBody::new(
                "world",
                ModelInstanceIndex::world(),
                MassProperties::massless(),
            )],
            joints: Vec::new(),
            actuators: Vec::new(),
            instance_names: vec!["world".to_string(), "default".to_string()],
            gravity: None,
            finalized: false,
            nq: 0,
            nv: 0,
            body_inboard_joint: Vec::new(),
        }
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

    /// Whether `finalize()` has been called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn require_finalized(&self, method: &'static str) -> Result<()> {
        self.throw_if_not_finalized(method)
    }

    /// The inboard joint of the body with the given raw index, if any.
    pub(crate) fn inboard_joint(&self, body_raw: usize) -> Option<JointIndex> {
        self.body_inboard_joint[body_raw]
    }

    /// World-frame axis of a single-dof joint by index.
    pub(crate) fn single_dof_axis_in_world(
        &self,
        pc: &PositionKinematicsCache,
        joint: JointIndex,
    ) -> Vector3<f64> {
        self.joint_axis_in_world(pc, &self.joints[joint.raw()])
    }

    // ===================== Topology construction =====================

    /// Add a model instance and return its index.
    pub fn add_model_instance(&mut self, name: impl Into<String>) -> Result<ModelInstanceIndex> {
        self.throw_if_finalized("add_model_instance")?;
        self.instance_names.push(name.into());
        Ok(ModelInstanceIndex::new(self.instance_names.len() - 1))
    }

    /// Add a rigid body and return its index.
    pub fn add_rigid_body(
        &mut self,
        name: impl Into<String>,
        instance: ModelInstanceIndex,
        mass_properties: MassProperties,
    ) -> Result<BodyIndex> {
        self.throw_if_finalized("add_rigid_body")?;
        self.check_instance(instance)?;
        self.bodies
            .push(RigidBody::new(name, instance, mass_properties));
        Ok(BodyIndex::new(self.bodies.len() - 1))
    }

    /// Add a joint connecting `parent` to `child` and return its index.
    ///
    /// The parent must have been registered before the child (body index
    /// order is the computation order), the child must not be the world and
    /// must not already have an inboard joint, and free joints must attach
    /// directly to the world with an identity `pose_in_parent`.
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
        self.check_instance(instance)?;
        self.check_body(parent)?;
        self.check_body(child)?;
        if child.is_world() {
            return Err(PlantError::invalid_argument(
                "the world cannot be a joint's child body".to_string(),
            ));
        }
        if parent.raw() >= child.raw() {
            return Err(PlantError::invalid_argument(format!(
                "joint parent {parent} must be registered before child {child}"
            )));
        }
        if self
            .joints
            .iter()
            .any(|joint| joint.child_body() == child)
        {
            return Err(PlantError::invalid_argument(format!(
                "body '{}' already has an inboard joint",
                self.bodies[child.raw()].name()
            )));
        }
        if !damping.is_finite() || damping < 0.0 {
            return Err(PlantError::invalid_argument(format!(
                "joint damping must be finite and non-negative, got {damping}"
            )));
        }
        let kind = match kind {
            JointKind::Free => {
                if !parent.is_world() {
                    return Err(PlantError::invalid_argument(
                        "free joints must attach their child directly to the world".to_string(),
                    ));
                }
                if pose_in_parent != Isometry3::identity() {
                    return Err(PlantError::invalid_argument(
                        "free joints require an identity pose_in_parent".to_string(),
                    ));
                }
                JointKind::Free
            }
            JointKind::Revolute { axis } => JointKind::Revolute {
                axis: normalized_axis(axis)?,
            },
            JointKind::Prismatic { axis } => JointKind::Prismatic {
                axis: normalized_axis(axis)?,
            },
            JointKind::Weld => JointKind::Weld,
        };
        self.joints.push(Joint::new(
            name,
            instance,
            parent,
            child,
            kind,
            pose_in_parent,
            damping,
        ));
        Ok(JointIndex::new(self.joints.len() - 1))
    }

    /// Add an actuator on a single-degree-of-freedom joint.
    pub fn add_joint_actuator(
        &mut self,
        name: impl Into<String>,
        joint: JointIndex,
    ) -> Result<ActuatorIndex> {
        self.throw_if_finalized("add_joint_actuator")?;
        self.check_joint(joint)?;
        let target = &self.joints[joint.raw()];
        if target.num_velocities() != 1 {
            return Err(PlantError::invalid_argument(format!(
                "actuators require a single-dof joint; '{}' has {} dofs",
                target.name(),
                target.num_velocities()
            )));
        }
        let instance = target.model_instance();
        self.actuators
            .push(JointActuator::new(name, instance, joint));
        Ok(ActuatorIndex::new(self.actuators.len() - 1))
    }

    /// Install a uniform gravity field (m/s², world frame).
    pub fn set_uniform_gravity(&mut self, gravity: Vector3<f64>) -> Result<()> {
        self.throw_if_finalized("set_uniform_gravity")?;
        self.gravity = Some(gravity);
        Ok(())
    }

    /// The configured gravity field, if any.
    #[must_use]
    pub fn gravity_field(&self) -> Option<&Vector3<f64>> {
        self.gravity.as_ref()
    }

    /// Freeze the topology: assign state offsets and verify connectivity.
    pub fn finalize(&mut self) -> Result<()> {
        self.throw_if_finalized("finalize")?;

        let mut inboard = vec![None; self.bodies.len()];
        let mut nq = 0;
        let mut nv = 0;
        for (index, joint) in self.joints.iter_mut().enumerate() {
            joint.q_start = nq;
            joint.v_start = nv;
            nq += joint.num_positions();
            nv += joint.num_velocities();
            inboard[joint.child_body().raw()] = Some(JointIndex::new(index));
        }
        for (index, body) in self.bodies.iter().enumerate().skip(1) {
            if inboard[index].is_none() {
                return Err(PlantError::invalid_argument(format!(
                    "body '{}' has no inboard joint; every body must be \
                     connected to the world",
                    body.name()
                )));
            }
        }

        self.nq = nq;
        self.nv = nv;
        self.body_inboard_joint = inboard;
        self.finalized = true;
        Ok(())
    }

    // ===================== Sizes and accessors =====================

    /// Number of bodies, world included.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Number of actuators.
    #[must_use]
    pub fn num_actuators(&self) -> usize {
        self.actuators.len()
    }

    /// Number of actuated degrees of freedom (one per actuator).
    #[must_use]
    pub fn num_actuated_dofs(&self) -> usize {
        self.actuators.len()
    }

    /// Number of model instances.
    #[must_use]
    pub fn num_model_instances(&self) -> usize {
        self.instance_names.len()
    }

    /// Number of position coordinates `nq`.
    #[must_use]
    pub fn num_positions(&self) -> usize {
        self.nq
    }

    /// Number of generalized velocities `nv`.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        self.nv
    }

    /// Size of the full state `[q; v]`.
    #[must_use]
    pub fn num_multibody_states(&self) -> usize {
        self.nq + self.nv
    }

    /// A body by index.
    #[must_use]
    pub fn get_body(&self, body: BodyIndex) -> &RigidBody {
        &self.bodies[body.raw()]
    }

    /// A joint by index.
    #[must_use]
    pub fn get_joint(&self, joint: JointIndex) -> &Joint {
        &self.joints[joint.raw()]
    }

    /// An actuator by index.
    #[must_use]
    pub fn get_joint_actuator(&self, actuator: ActuatorIndex) -> &JointActuator {
        &self.actuators[actuator.raw()]
    }

    /// All joints, in index order.
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// All actuators, in index order.
    #[must_use]
    pub fn actuators(&self) -> &[JointActuator] {
        &self.actuators
    }

    /// The maximum default body mass across the whole model, world included.
    #[must_use]
    pub fn max_default_mass(&self) -> f64 {
        self.bodies
            .iter()
            .map(RigidBody::default_mass)
            .fold(0.0, f64::max)
    }

    // ===================== Per-instance queries =====================

    fn check_instance(&self, instance: ModelInstanceIndex) -> Result<()> {
        if instance.raw() >= self.instance_names.len() {
            return Err(PlantError::invalid_argument(format!(
                "invalid model instance {instance}"
            )));
        }
        Ok(())
    }

    fn check_body(&self, body: BodyIndex) -> Result<()> {
        if body.raw() >= self.bodies.len() {
            return Err(PlantError::invalid_argument(format!(
                "invalid body index {body}"
            )));
        }
        Ok(())
    }

    fn check_joint(&self, joint: JointIndex) -> Result<()> {
        if joint.raw() >= self.joints.len() {
            return Err(PlantError::invalid_argument(format!(
                "invalid joint index {joint}"
            )));
        }
        Ok(())
    }

    fn instance_joints(
        &self,
        instance: ModelInstanceIndex,
    ) -> impl Iterator<Item = &Joint> {
        self.joints
            .iter()
            .filter(move |joint| joint.model_instance() == instance)
    }

    /// Number of position coordinates belonging to an instance.
    pub fn num_instance_positions(&self, instance: ModelInstanceIndex) -> Result<usize> {
        self.check_instance(instance)?;
        Ok(self.instance_joints(instance).map(Joint::num_positions).sum())
    }

    /// Number of velocity coordinates belonging to an instance.
    pub fn num_instance_velocities(&self, instance: ModelInstanceIndex) -> Result<usize> {
        self.check_instance(instance)?;
        Ok(self
            .instance_joints(instance)
            .map(Joint::num_velocities)
            .sum())
    }

    /// State size `[q_i; v_i]` of an instance.
    pub fn num_instance_states(&self, instance: ModelInstanceIndex) -> Result<usize> {
        Ok(self.num_instance_positions(instance)? + self.num_instance_velocities(instance)?)
    }

    /// Number of actuated degrees of freedom in an instance.
    pub fn num_instance_actuated_dofs(&self, instance: ModelInstanceIndex) -> Result<usize> {
        self.check_instance(instance)?;
        Ok(self
            .actuators
            .iter()
            .filter(|actuator| actuator.model_instance() == instance)
            .count())
    }

    /// Extract an instance's position coordinates from a full `q`.
    pub fn get_positions_from_array(
        &self,
        instance: ModelInstanceIndex,
        q: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("get_positions_from_array")?;
        self.check_instance(instance)?;
        self.check_length("q", q, self.nq)?;
        let mut out = Vec::new();
        for joint in self.instance_joints(instance) {
            for k in 0..joint.num_positions() {
                out.push(q[joint.q_start + k]);
            }
        }
        Ok(DVector::from_vec(out))
    }

    /// Extract an instance's velocity-ordered coordinates from a full
    /// `nv`-length array (velocities, generalized forces, …).
    pub fn get_velocities_from_array(
        &self,
        instance: ModelInstanceIndex,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("get_velocities_from_array")?;
        self.check_instance(instance)?;
        self.check_length("v", v, self.nv)?;
        let mut out = Vec::new();
        for joint in self.instance_joints(instance) {
            for k in 0..joint.num_velocities() {
                out.push(v[joint.v_start + k]);
            }
        }
        Ok(DVector::from_vec(out))
    }

    fn check_length(&self, name: &str, vec: &DVector<f64>, expected: usize) -> Result<()> {
        if vec.len() != expected {
            return Err(PlantError::invalid_argument(format!(
                "{name} has length {}, expected {expected}",
                vec.len()
            )));
        }
        Ok(())
    }

    // ===================== Default state and helpers =====================

    /// Default positions: every joint at its zero configuration (identity
    /// quaternion and zero translation for free joints).
    #[must_use]
    pub fn default_positions(&self) -> DVector<f64> {
        let mut q = DVector::zeros(self.nq);
        for joint in &self.joints {
            if matches!(joint.kind(), JointKind::Free) {
                q[joint.q_start] = 1.0; // quaternion scalar part
            }
        }
        q
    }

    /// Write a free joint's pose into a positions array.
    pub fn set_free_joint_pose(
        &self,
        joint: JointIndex,
        pose: &Isometry3<f64>,
        q: &mut DVector<f64>,
    ) -> Result<()> {
        self.throw_if_not_finalized("set_free_joint_pose")?;
        self.check_joint(joint)?;
        let joint = &self.joints[joint.raw()];
        if !matches!(joint.kind(), JointKind::Free) {
            return Err(PlantError::invalid_argument(format!(
                "joint '{}' is not a free joint",
                joint.name()
            )));
        }
        let quat = pose.rotation.quaternion();
        q[joint.q_start] = quat.scalar();
        q[joint.q_start + 1] = quat.imag().x;
        q[joint.q_start + 2] = quat.imag().y;
        q[joint.q_start + 3] = quat.imag().z;
        q[joint.q_start + 4] = pose.translation.vector.x;
        q[joint.q_start + 5] = pose.translation.vector.y;
        q[joint.q_start + 6] = pose.translation.vector.z;
        Ok(())
    }

    /// Write a free joint's spatial velocity into a velocities array.
    pub fn set_free_joint_velocity(
        &self,
        joint: JointIndex,
        velocity: &SpatialVelocity,
        v: &mut DVector<f64>,
    ) -> Result<()> {
        self.throw_if_not_finalized("set_free_joint_velocity")?;
        self.check_joint(joint)?;
        let joint = &self.joints[joint.raw()];
        if !matches!(joint.kind(), JointKind::Free) {
            return Err(PlantError::invalid_argument(format!(
                "joint '{}' is not a free joint",
                joint.name()
            )));
        }
        for k in 0..3 {
            v[joint.v_start + k] = velocity.angular[k];
            v[joint.v_start + 3 + k] = velocity.linear[k];
        }
        Ok(())
    }

    // ===================== Kinematics =====================

    /// Pose `X_JB` of the child frame in the joint frame at configuration q.
    fn joint_transform(&self, joint: &Joint, q: &DVector<f64>) -> Isometry3<f64> {
        match joint.kind() {
            JointKind::Free => {
                let quat = Quaternion::new(
                    q[joint.q_start],
                    q[joint.q_start + 1],
                    q[joint.q_start + 2],
                    q[joint.q_start + 3],
                );
                let rotation = UnitQuaternion::from_quaternion(quat);
                let translation = Translation3::new(
                    q[joint.q_start + 4],
                    q[joint.q_start + 5],
                    q[joint.q_start + 6],
                );
                Isometry3::from_parts(translation, rotation)
            }
            JointKind::Revolute { axis } => {
                let rotation =
                    UnitQuaternion::from_axis_angle(&Unit::new_unchecked(*axis), q[joint.q_start]);
                Isometry3::from_parts(Translation3::identity(), rotation)
            }
            JointKind::Prismatic { axis } => Isometry3::from_parts(
                Translation3::from(axis * q[joint.q_start]),
                UnitQuaternion::identity(),
            ),
            JointKind::Weld => Isometry3::identity(),
        }
    }

    /// Compute world poses of every body.
    pub fn calc_position_kinematics_cache(
        &self,
        q: &DVector<f64>,
    ) -> Result<PositionKinematicsCache> {
        self.throw_if_not_finalized("calc_position_kinematics_cache")?;
        self.check_length("q", q, self.nq)?;
        let mut poses = vec![Isometry3::identity(); self.bodies.len()];
        for index in 1..self.bodies.len() {
            // finalize() guarantees an inboard joint for every body.
            let Some(joint_index) = self.body_inboard_joint[index] else {
                continue;
            };
            let joint = &self.joints[joint_index.raw()];
            let x_wp = poses[joint.parent_body().raw()];
            poses[index] = x_wp * joint.pose_in_parent() * self.joint_transform(joint, q);
        }
        Ok(PositionKinematicsCache { poses })
    }

    /// The world-frame axis of a single-dof joint at the current poses.
    ///
    /// The child frame's rotation relative to the joint frame is either the
    /// identity (prismatic) or a rotation about the axis itself (revolute),
    /// so the axis can be read off the child pose directly.
    fn joint_axis_in_world(&self, pc: &PositionKinematicsCache, joint: &Joint) -> Vector3<f64> {
        match joint.kind() {
            JointKind::Revolute { axis } | JointKind::Prismatic { axis } => {
                pc.pose(joint.child_body()).rotation * *axis
            }
            JointKind::Free | JointKind::Weld => Vector3::zeros(),
        }
    }

    /// Compute world spatial velocities of every body.
    pub fn calc_velocity_kinematics_cache(
        &self,
        pc: &PositionKinematicsCache,
        v: &DVector<f64>,
    ) -> Result<VelocityKinematicsCache> {
        self.throw_if_not_finalized("calc_velocity_kinematics_cache")?;
        self.check_length("v", v, self.nv)?;
        let mut velocities = vec![SpatialVelocity::zero(); self.bodies.len()];
        for index in 1..self.bodies.len() {
            let Some(joint_index) = self.body_inboard_joint[index] else {
                continue;
            };
            let joint = &self.joints[joint_index.raw()];
            let parent = joint.parent_body().raw();
            let r = pc.poses[index].translation.vector - pc.poses[parent].translation.vector;
            let mut velocity = velocities[parent].shift(&r);
            match joint.kind() {
                JointKind::Free => {
                    velocity = SpatialVelocity::new(
                        Vector3::new(
                            v[joint.v_start],
                            v[joint.v_start + 1],
                            v[joint.v_start + 2],
                        ),
                        Vector3::new(
                            v[joint.v_start + 3],
                            v[joint.v_start + 4],
                            v[joint.v_start + 5],
                        ),
                    );
                }
                JointKind::Revolute { .. } => {
                    let axis = self.joint_axis_in_world(pc, joint);
                    velocity.angular += axis * v[joint.v_start];
                }
                JointKind::Prismatic { .. } => {
                    let axis = self.joint_axis_in_world(pc, joint);
                    velocity.linear += axis * v[joint.v_start];
                }
                JointKind::Weld => {}
            }
            velocities[index] = velocity;
        }
        Ok(VelocityKinematicsCache { velocities })
    }

    /// The 3×nv Jacobian of a world point Q fixed to `body`, such that the
    /// point's world velocity is `v_WQ = J · v`.
    pub fn calc_points_geometric_jacobian_expressed_in_world(
        &self,
        pc: &PositionKinematicsCache,
        body: BodyIndex,
        p_wq: &Point3<f64>,
    ) -> Result<DMatrix<f64>> {
        self.throw_if_not_finalized("calc_points_geometric_jacobian_expressed_in_world")?;
        self.check_body(body)?;
        let mut jacobian = DMatrix::zeros(3, self.nv);
        let mut current = body;
        while !current.is_world() {
            let Some(joint_index) = self.body_inboard_joint[current.raw()] else {
                break;
            };
            let joint = &self.joints[joint_index.raw()];
            let child_origin = pc.poses[joint.child_body().raw()].translation.vector;
            match joint.kind() {
                JointKind::Revolute { .. } => {
                    let axis = self.joint_axis_in_world(pc, joint);
                    let column = axis.cross(&(p_wq.coords - child_origin));
                    for k in 0..3 {
                        jacobian[(k, joint.v_start)] += column[k];
                    }
                }
                JointKind::Prismatic { .. } => {
                    let axis = self.joint_axis_in_world(pc, joint);
                    for k in 0..3 {
                        jacobian[(k, joint.v_start)] += axis[k];
                    }
                }
                JointKind::Free => {
                    let r = p_wq.coords - child_origin;
                    for i in 0..3 {
                        let column = Vector3::ith(i, 1.0).cross(&r);
                        for k in 0..3 {
                            jacobian[(k, joint.v_start + i)] += column[k];
                        }
                        jacobian[(i, joint.v_start + 3 + i)] += 1.0;
                    }
                }
                JointKind::Weld => {}
            }
            current = joint.parent_body();
        }
        Ok(jacobian)
    }

    // ===================== q̇ ↔ v maps =====================

    /// Map generalized velocities to position-coordinate rates,
    /// `q̇ = N(q)·v`.
    pub fn map_velocity_to_qdot(&self, q: &DVector<f64>, v: &DVector<f64>) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("map_velocity_to_qdot")?;
        self.check_length("q", q, self.nq)?;
        self.check_length("v", v, self.nv)?;
        let mut qdot = DVector::zeros(self.nq);
        for joint in &self.joints {
            match joint.kind() {
                JointKind::Free => {
                    let quat = UnitQuaternion::from_quaternion(Quaternion::new(
                        q[joint.q_start],
                        q[joint.q_start + 1],
                        q[joint.q_start + 2],
                        q[joint.q_start + 3],
                    ));
                    let omega = Vector3::new(
                        v[joint.v_start],
                        v[joint.v_start + 1],
                        v[joint.v_start + 2],
                    );
                    // World-frame angular velocity: q̇ = ½ (0, ω) ⊗ q.
                    let quat_dot = Quaternion::from_imag(omega) * quat.into_inner() * 0.5;
                    qdot[joint.q_start] = quat_dot.scalar();
                    qdot[joint.q_start + 1] = quat_dot.imag().x;
                    qdot[joint.q_start + 2] = quat_dot.imag().y;
                    qdot[joint.q_start + 3] = quat_dot.imag().z;
                    for k in 0..3 {
                        qdot[joint.q_start + 4 + k] = v[joint.v_start + 3 + k];
                    }
                }
                JointKind::Revolute { .. } | JointKind::Prismatic { .. } => {
                    qdot[joint.q_start] = v[joint.v_start];
                }
                JointKind::Weld => {}
            }
        }
        Ok(qdot)
    }

    /// Map position-coordinate rates to generalized velocities,
    /// `v = N⁺(q)·q̇`.
    pub fn map_qdot_to_velocity(
        &self,
        q: &DVector<f64>,
        qdot: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.throw_if_not_finalized("map_qdot_to_velocity")?;
        self.check_length("q", q, self.nq)?;
        self.check_length("qdot", qdot, self.nq)?;
        let mut v = DVector::zeros(self.nv);
        for joint in &self.joints {
            match joint.kind() {
                JointKind::Free => {
                    let quat = UnitQuaternion::from_quaternion(Quaternion::new(
                        q[joint.q_start],
                        q[joint.q_start + 1],
                        q[joint.q_start + 2],
                        q[joint.q_start + 3],
                    ));
                    let quat_dot = Quaternion::new(
                        qdot[joint.q_start],
                        qdot[joint.q_start + 1],
                        qdot[joint.q_start + 2],
                        qdot[joint.q_start + 3],
                    );
                    // Inverse of the kinematic map: (0, ω) = 2 q̇ ⊗ q⁻¹.
                    let omega_quat = quat_dot * quat.inverse().into_inner() * 2.0;
                    let omega = omega_quat.imag();
                    for k in 0..3 {
                        v[joint.v_start + k] = omega[k];
                        v[joint.v_start + 3 + k] = qdot[joint.q_start + 4 + k];
                    }
                }
                JointKind::Revolute { .. } | JointKind::Prismatic { .. } => {
                    v[joint.v_start] = qdot[joint.q_start];
                }
                JointKind::Weld => {}
            }
        }
        Ok(v)
    }
}

fn normalized_axis(axis: Vector3<f64>) -> Result<Vector3<f64>> {
    let norm = axis.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return Err(PlantError::invalid_argument(
            "joint axis must have non-zero length".to_string(),
        ));
    }
    Ok(axis / norm)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn pendulum() -> (MultibodyTree, JointIndex) {
        // A point mass hanging a length below a revolute joint about +Y.
        let mut tree = MultibodyTree::new();
        let body = tree
            .add_rigid_body(
                "bob",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass_at(1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .unwrap();
        let joint = tree
            .add_joint(
                "pivot",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                body,
                JointKind::Revolute { axis: Vector3::y() },
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        tree.finalize().unwrap();
        (tree, joint)
    }

    fn free_sphere() -> (MultibodyTree, JointIndex) {
        let mut tree = MultibodyTree::new();
        let body = tree
            .add_rigid_body(
                "ball",
                ModelInstanceIndex::default_instance(),
                MassProperties::solid_sphere(1.0, 0.1),
            )
            .unwrap();
        let joint = tree
            .add_joint(
                "floating",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                body,
                JointKind::Free,
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        tree.finalize().unwrap();
        (tree, joint)
    }

    #[test]
    fn test_lifecycle_guards() {
        let mut tree = MultibodyTree::new();
        let q = DVector::zeros(0);
        assert!(matches!(
            tree.calc_position_kinematics_cache(&q).unwrap_err(),
            PlantError::PreFinalizeUse { .. }
        ));
        tree.finalize().unwrap();
        assert!(matches!(
            tree.add_model_instance("late").unwrap_err(),
            PlantError::PostFinalizeMutation { .. }
        ));
        assert!(matches!(
            tree.finalize().unwrap_err(),
            PlantError::PostFinalizeMutation { .. }
        ));
    }

    #[test]
    fn test_disconnected_body_rejected_at_finalize() {
        let mut tree = MultibodyTree::new();
        tree.add_rigid_body(
            "floating in the void",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(1.0),
        )
        .unwrap();
        assert!(tree.finalize().is_err());
    }

    #[test]
    fn test_state_sizes() {
        let (tree, _) = free_sphere();
        assert_eq!(tree.num_positions(), 7);
        assert_eq!(tree.num_velocities(), 6);
        assert_eq!(tree.num_multibody_states(), 13);

        let (tree, _) = pendulum();
        assert_eq!(tree.num_positions(), 1);
        assert_eq!(tree.num_velocities(), 1);
    }

    #[test]
    fn test_pendulum_forward_kinematics() {
        let (tree, joint) = pendulum();
        let joint = tree.get_joint(joint);
        let mut q = tree.default_positions();
        q[joint.position_start()] = FRAC_PI_2;
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        // Rotating +90° about Y carries the com offset (0,0,-0.5) to
        // (-0.5, 0, 0).
        let com_w = pc.pose(BodyIndex::new(1)) * Point3::new(0.0, 0.0, -0.5);
        assert_relative_eq!(com_w.x, -0.5, epsilon = 1e-12);
        assert_relative_eq!(com_w.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_sphere_velocity_kinematics() {
        let (tree, joint) = free_sphere();
        let q = tree.default_positions();
        let mut v = DVector::zeros(6);
        tree.set_free_joint_velocity(
            joint,
            &SpatialVelocity::new(Vector3::z(), Vector3::x()),
            &mut v,
        )
        .unwrap();
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let vc = tree.calc_velocity_kinematics_cache(&pc, &v).unwrap();
        let velocity = vc.velocity(BodyIndex::new(1));
        assert_relative_eq!(velocity.angular, Vector3::z(), epsilon = 1e-14);
        assert_relative_eq!(velocity.linear, Vector3::x(), epsilon = 1e-14);
    }

    #[test]
    fn test_point_jacobian_matches_direct_velocity() {
        let (tree, joint) = free_sphere();
        let q = tree.default_positions();
        let mut v = DVector::zeros(6);
        tree.set_free_joint_velocity(
            joint,
            &SpatialVelocity::new(Vector3::new(0.3, -0.1, 0.2), Vector3::new(1.0, 0.5, -0.4)),
            &mut v,
        )
        .unwrap();
        let pc = tree.calc_position_kinematics_cache(&q).unwrap();
        let vc = tree.calc_velocity_kinematics_cache(&pc, &v).unwrap();

        let p_wq = Point3::new(0.2, -0.3, 0.7);
        let jacobian = tree
            .calc_points_geometric_jacobian_expressed_in_world(&pc, BodyIndex::new(1), &p_wq)
            .unwrap();
        let from_jacobian = &jacobian * &v;

        let body_velocity = vc.velocity(BodyIndex::new(1));
        let origin = pc.pose(BodyIndex::new(1)).translation.vector;
        let direct = body_velocity.shift(&(p_wq.coords - origin)).linear;
        for k in 0..3 {
            assert_relative_eq!(from_jacobian[k], direct[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_qdot_roundtrip_through_velocity() {
        let (tree, joint) = free_sphere();
        let mut q = tree.default_positions();
        // A non-trivial orientation so the quaternion map is exercised.
        let pose = Isometry3::from_parts(
            Translation3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 0.9),
        );
        tree.set_free_joint_pose(joint, &pose, &mut q).unwrap();

        let mut v = DVector::zeros(6);
        tree.set_free_joint_velocity(
            joint,
            &SpatialVelocity::new(Vector3::new(0.7, 0.1, -0.3), Vector3::new(-1.0, 0.4, 2.0)),
            &mut v,
        )
        .unwrap();

        let qdot = tree.map_velocity_to_qdot(&q, &v).unwrap();
        let back = tree.map_qdot_to_velocity(&q, &qdot).unwrap();
        for k in 0..6 {
            assert_relative_eq!(back[k], v[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_instance_extraction() {
        let mut tree = MultibodyTree::new();
        let arm_instance = tree.add_model_instance("arm").unwrap();
        let ball_instance = tree.add_model_instance("ball").unwrap();

        let link = tree
            .add_rigid_body("link", arm_instance, MassProperties::point_mass(1.0))
            .unwrap();
        tree.add_joint(
            "elbow",
            arm_instance,
            BodyIndex::world(),
            link,
            JointKind::Revolute { axis: Vector3::x() },
            Isometry3::identity(),
            0.0,
        )
        .unwrap();

        let ball = tree
            .add_rigid_body("ball", ball_instance, MassProperties::point_mass(1.0))
            .unwrap();
        tree.add_joint(
            "floating",
            ball_instance,
            BodyIndex::world(),
            ball,
            JointKind::Free,
            Isometry3::identity(),
            0.0,
        )
        .unwrap();
        tree.finalize().unwrap();

        assert_eq!(tree.num_instance_positions(arm_instance).unwrap(), 1);
        assert_eq!(tree.num_instance_velocities(ball_instance).unwrap(), 6);

        let mut q = tree.default_positions();
        q[0] = 0.25; // the revolute angle
        let arm_q = tree.get_positions_from_array(arm_instance, &q).unwrap();
        assert_eq!(arm_q.len(), 1);
        assert_relative_eq!(arm_q[0], 0.25, epsilon = 1e-14);

        let ball_q = tree.get_positions_from_array(ball_instance, &q).unwrap();
        assert_eq!(ball_q.len(), 7);
        assert_relative_eq!(ball_q[0], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_actuator_requires_single_dof() {
        let mut tree = MultibodyTree::new();
        let ball = tree
            .add_rigid_body(
                "ball",
                ModelInstanceIndex::default_instance(),
                MassProperties::point_mass(1.0),
            )
            .unwrap();
        let floating = tree
            .add_joint(
                "floating",
                ModelInstanceIndex::default_instance(),
                BodyIndex::world(),
                ball,
                JointKind::Free,
                Isometry3::identity(),
                0.0,
            )
            .unwrap();
        assert!(tree.add_joint_actuator("thruster", floating).is_err());
    }

    #[test]
    fn test_max_default_mass() {
        let mut tree = MultibodyTree::new();
        tree.add_rigid_body(
            "light",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(0.5),
        )
        .unwrap();
        tree.add_rigid_body(
            "heavy",
            ModelInstanceIndex::default_instance(),
            MassProperties::point_mass(3.0),
        )
        .unwrap();
        assert_relative_eq!(tree.max_default_mass(), 3.0, epsilon = 1e-14);
    }
}
