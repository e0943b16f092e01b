//! Bind-path scenarios: dirty-bit discipline, batched binds, dedup, and
//! heap-change rebinds.

use super::*;
use crate::{ShaderStage, SlotMask};

#[test]
fn bind_emits_one_heap_set_and_one_table_bind() {
    let harness = Harness::new(2, 128);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    // Attaching the list sets the heaps once.
    assert_eq!(heap_set_count(&list), 1);
    assert_eq!(
        list.commands()[0],
        BindCommand::SetDescriptorHeaps {
            view_table: cache.active_view_table_id(),
            sampler_table: cache.active_sampler_table_id(),
        }
    );

    bindings
        .stage_cache_mut(ShaderStage::Pixel, DescriptorKind::ShaderResource)
        .set_slot(0, srv(7));
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::ShaderResource,
        0b1,
    );

    assert_eq!(heap_set_count(&list), 1, "heaps were already current");
    assert_eq!(table_bind_count(&list), 1, "one batched bind, not per-slot");

    let handle = last_bound_table(&list);
    assert_eq!(handle.table, harness.pool.table_id());
    assert_eq!(cache.view_heap_slot(handle.first_slot), srv(7));
    assert_eq!(cache.stats().view_tables_built, 1);
}

#[test]
fn unbound_slots_are_filled_with_the_null_placeholder() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    // Slots 0 and 2 bound, slot 1 left empty.
    let stage_cache = bindings.stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler);
    stage_cache.set_slot(0, sampler(3));
    stage_cache.set_slot(2, sampler(4));

    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        0b111,
    );

    let handle = last_bound_table(&list);
    assert_eq!(cache.local_sampler_slot(handle.first_slot), sampler(3));
    assert_eq!(
        cache.local_sampler_slot(handle.first_slot + 1),
        sampler(0),
        "unbound slot copies the default sampler"
    );
    assert_eq!(cache.local_sampler_slot(handle.first_slot + 2), sampler(4));
}

#[test]
fn dirty_bits_outside_the_bound_range_are_untouched() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Vertex,
        DescriptorKind::ShaderResource,
        0b1111,
    );

    let dirty = bindings
        .stage_cache(ShaderStage::Vertex, DescriptorKind::ShaderResource)
        .dirty_mask();
    assert_eq!(dirty & 0b1111, 0, "bound range is clean");
    assert_ne!(dirty >> 4, 0, "slots past the table are still dirty");

    // Nothing dirty intersects the range any more: rebinding is a no-op.
    let ops_before = list.commands().len();
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Vertex,
        DescriptorKind::ShaderResource,
        0b1111,
    );
    assert_eq!(list.commands().len(), ops_before);
}

#[test]
fn repeated_sampler_table_is_a_cache_hit() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    // Sampler table [5, 5, 0].
    let stage_cache = bindings.stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler);
    stage_cache.set_slot(0, sampler(5));
    stage_cache.set_slot(1, sampler(5));
    stage_cache.set_slot(2, sampler(0));
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        0b111,
    );

    let first_handle = last_bound_table(&list);
    let next_after_build = cache.local_sampler_next_slot();
    assert_eq!(cache.stats().sampler_tables_built, 1);

    // Dirty the table and land on the same [5, 5, 0] sequence again.
    let stage_cache = bindings.stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler);
    stage_cache.set_slot(0, sampler(9));
    stage_cache.set_slot(0, sampler(5));
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        0b111,
    );

    assert_eq!(last_bound_table(&list), first_handle, "identical handle");
    assert_eq!(
        cache.local_sampler_next_slot(),
        next_after_build,
        "a hit does not advance the heap"
    );
    assert_eq!(cache.stats().sampler_tables_built, 1);
    assert_eq!(cache.sampler_map_stats().hits, 1);

    let dirty = bindings
        .stage_cache(ShaderStage::Pixel, DescriptorKind::Sampler)
        .dirty_mask();
    assert_eq!(dirty & 0b111, 0, "a hit still cleans the bound range");
}

#[test]
fn heap_identity_change_redirties_the_whole_grid() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::ShaderResource,
        0b1,
    );
    let first = last_bound_table(&list);

    // Flip the sampler role to the shared heap; the next bind must re-set
    // heaps and rebuild even untouched view tables.
    cache.begin_frame();
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::ShaderResource,
        0b1,
    );

    assert_eq!(heap_set_count(&list), 2);
    assert_eq!(table_bind_count(&list), 2);
    let second = last_bound_table(&list);
    assert_eq!(second.table, first.table, "view heap itself did not change");
    assert_ne!(second.first_slot, first.first_slot, "table was rebuilt");
    assert_eq!(cache.stats().sampler_heap_changes, 1);
    assert_eq!(cache.stats().view_heap_changes, 0);
}

#[test]
fn a_new_command_list_always_resets_heaps() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();

    let list1 = harness.attach_list(&mut cache, &mut bindings);
    assert_eq!(heap_set_count(&list1), 1);

    let list2 = harness.attach_list(&mut cache, &mut bindings);
    assert_eq!(heap_set_count(&list2), 1);
    // The set on a fresh list is not a heap "change".
    assert_eq!(cache.stats().view_heap_changes, 0);
    assert_eq!(cache.stats().sampler_heap_changes, 0);
}

#[test]
fn sampler_rollover_invalidates_cached_tables() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache_with(DescriptorCacheConfig {
        local_sampler_capacity: 16,
        ..Default::default()
    });
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    // Table A: [7].
    bindings
        .stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler)
        .set_slot(0, sampler(7));
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        0b1,
    );
    assert_eq!(cache.stats().sampler_tables_built, 1);

    // Table B needs all 16 slots; the heap must roll over, dropping A's
    // cached entry with the retired generation.
    let full_mask: SlotMask = 0xFFFF;
    for slot in 0..16 {
        bindings
            .stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler)
            .set_slot(slot, sampler(20 + slot));
    }
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        full_mask,
    );
    assert_eq!(cache.stats().sampler_tables_built, 2);

    // Table A again: must miss and rebuild, not serve a stale handle.
    for slot in 1..16 {
        bindings
            .stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler)
            .set_slot(slot, None);
    }
    bindings
        .stage_cache_mut(ShaderStage::Pixel, DescriptorKind::Sampler)
        .set_slot(0, sampler(7));
    cache.bind_stage_resources(
        &mut list,
        &mut bindings,
        ShaderStage::Pixel,
        DescriptorKind::Sampler,
        0b1,
    );

    assert_eq!(cache.stats().sampler_tables_built, 3);
    assert_eq!(cache.sampler_map_stats().hits, 0);
}

#[test]
fn render_targets_substitute_the_null_placeholder() {
    let harness = Harness::new(1, 64);
    let mut cache = harness.cache();
    let mut bindings = BindingState::new();
    let mut list = harness.attach_list(&mut cache, &mut bindings);

    let rtv = OfflineDescriptor::new(DescriptorKind::RenderTarget, 5);
    let dsv = OfflineDescriptor::new(DescriptorKind::DepthStencil, 9);
    cache.set_render_targets(&mut list, &[Some(rtv), None], Some(dsv));

    assert_eq!(
        list.commands().last(),
        Some(&BindCommand::SetRenderTargets {
            colors: vec![rtv, OfflineDescriptor::null(DescriptorKind::RenderTarget)],
            depth: Some(dsv),
        })
    );
}
