//! 模型构建
//!
//! 接收已解析的骨骼、Morph、顶点、材质与物理数据，校验后生成运行时模型。

use super::config::get_config;
use super::runtime::{ModelParts, OtherModels};
use super::{Material, MmdModel, Vertex};
use crate::morph::{Morph, MorphManager};
use crate::physics::{
    JointDescriptor, MmdJoint, MmdRigidBody, MmdSoftBody, PhysicsEngine, RigidBodyDescriptor,
    SoftBodyDescriptor,
};
use crate::skeleton::{Bone, BoneManager};
use crate::{MmdError, Result};

/// 模型构建器
#[derive(Default)]
pub struct ModelBuilder {
    name: String,
    bones: Vec<Bone>,
    morphs: Vec<Morph>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    materials: Vec<Material>,
    rigid_bodies: Vec<RigidBodyDescriptor>,
    joints: Vec<JointDescriptor>,
    soft_bodies: Vec<SoftBodyDescriptor>,
    physics: Option<Box<dyn PhysicsEngine>>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_bone(&mut self, bone: Bone) -> usize {
        self.bones.push(bone);
        self.bones.len() - 1
    }

    pub fn add_morph(&mut self, morph: Morph) -> usize {
        self.morphs.push(morph);
        self.morphs.len() - 1
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn add_indices(&mut self, indices: &[u32]) {
        self.indices.extend_from_slice(indices);
    }

    /// 材质按添加顺序依次占用索引缓冲区
    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_rigid_body(&mut self, descriptor: RigidBodyDescriptor) -> usize {
        self.rigid_bodies.push(descriptor);
        self.rigid_bodies.len() - 1
    }

    pub fn add_joint(&mut self, descriptor: JointDescriptor) -> usize {
        self.joints.push(descriptor);
        self.joints.len() - 1
    }

    pub fn add_soft_body(&mut self, descriptor: SoftBodyDescriptor) -> usize {
        self.soft_bodies.push(descriptor);
        self.soft_bodies.len() - 1
    }

    /// 物理后端；不设置时模型只做运动学动画
    pub fn set_physics_engine(&mut self, engine: Box<dyn PhysicsEngine>) {
        self.physics = Some(engine);
    }

    fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(MmdError::InvalidModel(format!(
                "索引 {} 超出顶点数 {}",
                index, vertex_count
            )));
        }
        let material_indices: usize = self.materials.iter().map(|m| m.index_count).sum();
        if material_indices > self.indices.len() {
            return Err(MmdError::InvalidModel(format!(
                "材质索引总数 {} 超出索引缓冲区 {}",
                material_indices,
                self.indices.len()
            )));
        }
        let bone_count = self.bones.len() as i32;
        for bone in &self.bones {
            if let Some(ik) = &bone.ik_config {
                if ik.effector_bone < 0 || ik.effector_bone >= bone_count {
                    return Err(MmdError::InvalidModel(format!(
                        "IK 骨骼 {} 的效应器索引越界: {}",
                        bone.name, ik.effector_bone
                    )));
                }
            }
        }
        Ok(())
    }

    /// 校验并生成模型
    ///
    /// 刚体创建失败时模型仍然可用，只是不带物理。
    pub fn build(self) -> Result<MmdModel> {
        self.validate()?;

        let mut bone_manager = BoneManager::new();
        for bone in self.bones {
            bone_manager.add_bone(bone);
        }
        bone_manager.build_hierarchy()?;

        let mut morph_manager = MorphManager::new();
        for morph in self.morphs {
            morph_manager.add_morph(morph);
        }

        let has_rigid_bodies = !self.rigid_bodies.is_empty();
        let mut model = MmdModel::new(ModelParts {
            name: self.name,
            bone_manager,
            morph_manager,
            vertices: self.vertices,
            indices: self.indices,
            materials: self.materials,
            rigid_bodies: self.rigid_bodies.into_iter().map(MmdRigidBody::new).collect(),
            joints: self.joints.into_iter().map(MmdJoint::new).collect(),
            soft_bodies: self.soft_bodies.into_iter().map(MmdSoftBody::new).collect(),
        });
        model.split_bones_per_material(get_config().max_bone_uniforms);

        match self.physics {
            Some(engine) => {
                model.bind_physics(engine);
            }
            None if has_rigid_bodies => {
                log::info!("模型 {} 没有物理后端，只做运动学动画", model.name);
            }
            None => {}
        }
        model.perform_all_bones_transform(&OtherModels::none());

        log::info!(
            "模型 {} 构建完成: {} 个顶点, {} 个骨骼, {} 个 Morph, {} 个材质",
            model.name,
            model.vertex_count(),
            model.bone_manager.bone_count(),
            model.morph_manager.morph_count(),
            model.material_count()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;
    use crate::model::VertexWeight;
    use crate::physics::{RecordingEngine, RigidBodyShape};
    use crate::skeleton::IkConfig;
    use crate::MmdError;

    fn minimal() -> ModelBuilder {
        let mut builder = ModelBuilder::new("最小");
        builder.add_bone(Bone::with_parent("センター", -1, Vec3::ZERO));
        builder.add_vertex(Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO, VertexWeight::Bdef1 { bone: 0 }));
        builder
    }

    #[test]
    fn test_rejects_index_out_of_range() {
        let mut builder = minimal();
        builder.add_indices(&[0, 1]);
        assert!(matches!(builder.build(), Err(MmdError::InvalidModel(_))));
    }

    #[test]
    fn test_rejects_material_past_index_buffer() {
        let mut builder = minimal();
        builder.add_indices(&[0, 0, 0]);
        builder.add_material(Material::new("a", 3));
        builder.add_material(Material::new("b", 3));
        assert!(matches!(builder.build(), Err(MmdError::InvalidModel(_))));
    }

    #[test]
    fn test_rejects_ik_effector_out_of_range() {
        let mut builder = minimal();
        let mut ik = Bone::with_parent("足IK", 0, Vec3::ZERO);
        ik.ik_config = Some(IkConfig {
            effector_bone: 5,
            iterations: 10,
            limit_angle: 1.0,
            links: Vec::new(),
        });
        builder.add_bone(ik);
        assert!(matches!(builder.build(), Err(MmdError::InvalidModel(_))));
    }

    #[test]
    fn test_rejects_parent_cycle() {
        let mut builder = ModelBuilder::new("環");
        builder.add_bone(Bone::with_parent("a", 1, Vec3::ZERO));
        builder.add_bone(Bone::with_parent("b", 0, Vec3::ZERO));
        assert!(matches!(builder.build(), Err(MmdError::InvalidModel(_))));
    }

    #[test]
    fn test_build_binds_rigid_bodies_and_joints() {
        let mut builder = minimal();
        builder.add_bone(Bone::with_parent("髪", 0, Vec3::Y));
        builder.add_rigid_body(RigidBodyDescriptor::new("頭", 0, RigidBodyShape::Sphere { radius: 1.0 }));
        builder.add_rigid_body(RigidBodyDescriptor::new("髪", 1, RigidBodyShape::Sphere { radius: 0.2 }));
        builder.add_joint(JointDescriptor::new("髪J", 0, 1));
        // 端点不存在的关节被跳过，不影响模型
        builder.add_joint(JointDescriptor::new("壊れ", 0, 9));
        builder.set_physics_engine(Box::new(RecordingEngine::default()));

        let model = builder.build().unwrap();
        assert!(model.has_physics());
        assert!(model.rigid_bodies.iter().all(|body| body.handle().is_some()));
        assert!(model.joints[0].handle().is_some());
        assert!(model.joints[1].handle().is_none());
        assert_eq!(model.name, "最小");
    }

    #[test]
    fn test_build_without_engine_is_kinematic_only() {
        let mut builder = minimal();
        builder.add_rigid_body(RigidBodyDescriptor::new("頭", 0, RigidBodyShape::Sphere { radius: 1.0 }));
        let model = builder.build().unwrap();
        assert!(!model.has_physics());
        assert!(!model.is_physics_active());
        assert_eq!(model.bone_index_hashes().len(), 0);
    }
}
