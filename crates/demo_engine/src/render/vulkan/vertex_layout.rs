//! Vulkan vertex input descriptions for asset vertex layouts
//!
//! Kept apart from the asset module so `VertexLayout` stays backend-agnostic.

use ash::vk;
use crate::assets::{VertexComponent, VertexLayout};

fn component_format(component: VertexComponent) -> vk::Format {
    match component.float_count() {
        1 => vk::Format::R32_SFLOAT,
        2 => vk::Format::R32G32_SFLOAT,
        4 => vk::Format::R32G32B32A32_SFLOAT,
        _ => vk::Format::R32G32B32_SFLOAT,
    }
}

/// Per-vertex binding for `layout` at `binding`
pub fn binding_description(layout: &VertexLayout, binding: u32) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding,
        stride: layout.stride(),
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Attributes for `layout`, assigned consecutive locations from `first_location`
pub fn attribute_descriptions(
    layout: &VertexLayout,
    binding: u32,
    first_location: u32,
) -> Vec<vk::VertexInputAttributeDescription> {
    layout
        .offsets()
        .zip(first_location..)
        .map(|((component, offset), location)| vk::VertexInputAttributeDescription {
            location,
            binding,
            format: component_format(component),
            offset,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_descriptions_match_layout() {
        let layout = VertexLayout::new([VertexComponent::Position, VertexComponent::Uv, VertexComponent::DummyVec4]);
        let attributes = attribute_descriptions(&layout, 0, 0);

        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attributes[2].location, 2);
        assert_eq!(binding_description(&layout, 0).stride, 36);
    }
}
