use ash::vk;
use ash::vk::Handle as _;
use glam::{Mat4, Vec4};
use crate::renderer::resources::handle::Handle;
use crate::renderer::resources::material::Material;
use crate::renderer::resources::mesh::GpuMesh;

#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    pub mesh: Handle<GpuMesh>,
    pub material: Handle<Material>,
    pub transform: Mat4,
    pub color: Vec4,
}

/// Draw order key: pipeline first, then mesh
type SortKey = (u64, u64);

/// State change or draw issued while walking a [`RenderObjectList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStep {
    BindMaterial(Handle<Material>),
    BindMesh(Handle<GpuMesh>),
    /// Draw the object at this position in the list
    Draw(usize),
}

/// Render objects kept sorted by pipeline and then mesh, so that drawing
/// them in order changes GPU state as rarely as possible
#[derive(Debug, Default)]
pub struct RenderObjectList {
    keys: Vec<SortKey>,
    objects: Vec<RenderObject>,
}

impl RenderObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects with an equal key keep their insertion order
    pub fn insert(&mut self, object: RenderObject, pipeline: vk::Pipeline) {
        let key = (pipeline.as_raw(), object.mesh.raw());
        let position = self.keys.partition_point(|k| *k <= key);
        self.keys.insert(position, key);
        self.objects.insert(position, object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn as_slice(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Walk the list, binding a material or mesh only when it differs from the last one bound
    pub fn draw_steps(&self) -> Vec<DrawStep> {
        let mut steps = Vec::with_capacity(self.objects.len() * 3);
        let mut last_material = None;
        let mut last_mesh = None;

        for (i, object) in self.objects.iter().enumerate() {
            if last_material != Some(object.material) {
                steps.push(DrawStep::BindMaterial(object.material));
                last_material = Some(object.material);
            }
            if last_mesh != Some(object.mesh) {
                steps.push(DrawStep::BindMesh(object.mesh));
                last_mesh = Some(object.mesh);
            }
            steps.push(DrawStep::Draw(i));
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(mesh: u64, material: u64) -> RenderObject {
        RenderObject {
            mesh: Handle::from_raw(mesh),
            material: Handle::from_raw(material),
            transform: Mat4::IDENTITY,
            color: Vec4::ONE,
        }
    }

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first.clone());
                result.push(tail);
            }
        }
        result
    }

    #[test]
    fn sorted_by_pipeline_then_mesh_for_any_insertion_order() {
        // (mesh, material, pipeline)
        let inputs = [(1, 10, 100), (2, 10, 100), (1, 20, 200), (2, 20, 200), (1, 10, 100)];

        for order in permutations(&inputs) {
            let mut list = RenderObjectList::new();
            for (mesh, material, pipeline) in &order {
                list.insert(object(*mesh, *material), vk::Pipeline::from_raw(*pipeline));
            }

            let keys = list
                .as_slice()
                .iter()
                .map(|o| (o.material.raw(), o.mesh.raw()))
                .collect::<Vec<_>>();
            assert_eq!(keys, vec![(10, 1), (10, 1), (10, 2), (20, 1), (20, 2)]);
        }
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut list = RenderObjectList::new();
        let pipeline = vk::Pipeline::from_raw(1);
        for i in 0..3 {
            let mut o = object(5, 7);
            o.color = Vec4::splat(i as f32);
            list.insert(o, pipeline);
        }
        let colors = list.as_slice().iter().map(|o| o.color.x).collect::<Vec<_>>();
        assert_eq!(colors, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn state_is_bound_only_when_it_changes() {
        let mut list = RenderObjectList::new();
        list.insert(object(1, 10), vk::Pipeline::from_raw(100));
        list.insert(object(1, 10), vk::Pipeline::from_raw(100));
        list.insert(object(2, 10), vk::Pipeline::from_raw(100));
        list.insert(object(2, 20), vk::Pipeline::from_raw(200));

        assert_eq!(
            list.draw_steps(),
            vec![
                DrawStep::BindMaterial(Handle::from_raw(10)),
                DrawStep::BindMesh(Handle::from_raw(1)),
                DrawStep::Draw(0),
                DrawStep::Draw(1),
                DrawStep::BindMesh(Handle::from_raw(2)),
                DrawStep::Draw(2),
                DrawStep::BindMaterial(Handle::from_raw(20)),
                DrawStep::Draw(3),
            ],
        );
    }
}
