//! 模型关节与软体

use super::engine::{JointDescriptor, JointId, PhysicsEngine, SoftBodyDescriptor, SoftBodyId, SoftBodyVertex};
use super::mmd_rigid_body::MmdRigidBody;
use crate::{MmdError, Result};

/// 连接两个刚体的 6 自由度弹簧关节
#[derive(Clone, Debug)]
pub struct MmdJoint {
    pub descriptor: JointDescriptor,
    handle: Option<JointId>,
}

impl MmdJoint {
    pub fn new(descriptor: JointDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn handle(&self) -> Option<JointId> {
        self.handle
    }

    /// 创建物理句柄
    ///
    /// 两端刚体必须已经绑定；`index` 只用于错误信息。
    pub fn bind(
        &mut self,
        engine: &mut dyn PhysicsEngine,
        bodies: &[MmdRigidBody],
        index: usize,
    ) -> Result<JointId> {
        let resolve = |body: i32| {
            usize::try_from(body)
                .ok()
                .and_then(|i| bodies.get(i))
                .and_then(MmdRigidBody::handle)
                .ok_or(MmdError::UnboundRigidBody { joint: index, body })
        };
        let body_a = resolve(self.descriptor.rigid_body_a)?;
        let body_b = resolve(self.descriptor.rigid_body_b)?;
        let handle = engine.create_joint(&self.descriptor, body_a, body_b)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    pub fn destroy(&mut self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle.take() {
            engine.destroy_joint(handle);
        }
    }
}

/// 软体
///
/// 绑定成功后，其顶点由物理结果直接给出，不走蒙皮公式。
#[derive(Clone, Debug)]
pub struct MmdSoftBody {
    pub descriptor: SoftBodyDescriptor,
    handle: Option<SoftBodyId>,
}

impl MmdSoftBody {
    pub fn new(descriptor: SoftBodyDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<SoftBodyId> {
        self.handle
    }

    pub fn bind(&mut self, engine: &mut dyn PhysicsEngine) -> Result<SoftBodyId> {
        let handle = engine.create_soft_body(&self.descriptor)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    pub fn destroy(&mut self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle.take() {
            engine.destroy_soft_body(handle);
        }
    }

    /// 读回顶点；未绑定时为空
    pub fn pull_vertices(&self, engine: &dyn PhysicsEngine) -> Vec<SoftBodyVertex> {
        match self.handle {
            Some(handle) => engine.soft_body_vertices(handle),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::engine::{RigidBodyDescriptor, RigidBodyShape};
    use crate::physics::mmd_rigid_body::tests::RecordingEngine;

    #[test]
    fn test_joint_requires_bound_endpoints() {
        let mut engine = RecordingEngine::default();
        let shape = RigidBodyShape::Sphere { radius: 1.0 };
        let mut bodies = vec![
            MmdRigidBody::new(RigidBodyDescriptor::new("A", -1, shape)),
            MmdRigidBody::new(RigidBodyDescriptor::new("B", -1, shape)),
        ];
        bodies[0].bind(&mut engine, false).unwrap();

        let mut joint = MmdJoint::new(JointDescriptor::new("J", 0, 1));
        match joint.bind(&mut engine, &bodies, 7) {
            Err(MmdError::UnboundRigidBody { joint, body }) => {
                assert_eq!(joint, 7);
                assert_eq!(body, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(joint.handle().is_none());

        bodies[1].bind(&mut engine, false).unwrap();
        assert!(joint.bind(&mut engine, &bodies, 7).is_ok());
        assert_eq!(engine.joints.len(), 1);
    }

    #[test]
    fn test_soft_body_pull() {
        let mut engine = RecordingEngine::default();
        let mut soft_body = MmdSoftBody::new(SoftBodyDescriptor {
            name: "布".into(),
            material_index: 0,
            vertex_indices: vec![2, 5],
            total_mass: 1.0,
            collision_margin: 0.01,
        });
        assert!(soft_body.pull_vertices(&engine).is_empty());
        soft_body.bind(&mut engine).unwrap();
        let vertices = soft_body.pull_vertices(&engine);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].vertex_index, 5);
    }
}
