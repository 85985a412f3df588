use ash::vk;

/// The one queue the engine uses: it draws, presents and runs uploads
pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family: QueueFamily, handle: vk::Queue) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    pub index: u32,
    pub flags: vk::QueueFlags,
    /// Whether the family was checked against a surface
    pub presents: bool,
}

impl QueueFamily {
    pub fn new(index: u32, properties: vk::QueueFamilyProperties, presents: bool) -> Self {
        Self {
            index,
            flags: properties.queue_flags,
            presents,
        }
    }

    /// First family that can draw and, when `presenting`, also present.
    /// `can_present` is only asked about families that support graphics.
    pub fn select_graphics(
        families: &[vk::QueueFamilyProperties],
        presenting: bool,
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Option<Self> {
        families
            .iter()
            .enumerate()
            .filter(|(_, properties)| properties.queue_count > 0)
            .filter(|(_, properties)| properties.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .find(|(index, _)| !presenting || can_present(*index as u32))
            .map(|(index, properties)| Self::new(index as u32, *properties, presenting))
    }

    pub fn supports_graphics(&self) -> bool {
        self.flags.contains(vk::QueueFlags::GRAPHICS)
    }
}
