use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use nalgebra::{Matrix4, Vector3};

use wwt_layers::grid_layer::GridLayer;
use wwt_layers::imageset_layer::{DataSetType, ImageSet};
use wwt_layers::time::{utc_to_julian, SimClock};
use wwt_layers::{
    BodyPlacement, DrawCommand, EngineSettings, FadeType, FetchState, Layer, LayerManager, MemoryFetcher,
    RenderContext,
};

const ISS_LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

fn jd(y: i32, m: u32, d: u32, h: u32) -> f64 {
    utc_to_julian(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
}

fn offline_manager() -> LayerManager {
    let mut m = LayerManager::with_fetcher(EngineSettings::default(), Arc::new(MemoryFetcher::new()));
    m.init_layers();
    m.poll_fetches();
    m
}

fn grids(ctx: &RenderContext) -> Vec<&DrawCommand> {
    ctx.display_list.iter().filter(|c| matches!(c, DrawCommand::Grid { .. })).collect()
}

fn moon_row(planet: &str, name: &str, a_km: &str) -> String {
    [
        planet, "2451545.0", name, a_km, "0.0151", "214.0", "49.5", "1.57", "110.2", "1128.8", "", "", "", "", "",
        "", "11.1", "0.319",
    ]
    .join("\t")
}

#[test_log::test]
fn sky_layer_draws_once_at_full_opacity() {
    let mut m = offline_manager();
    let id = m
        .add_image_set_layer(ImageSet::new("DSS", "http://tiles/dss", DataSetType::Sky), "Sky")
        .unwrap();

    let clock = SimClock::at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    let mut ctx = m.render_context_for(&clock);
    m.draw(&mut ctx, 1.0, true, "Sky", true, false);

    assert_eq!(ctx.display_list.len(), 1);
    assert_eq!(ctx.display_list[0].layer_id(), Some(&id));
    assert_relative_eq!(ctx.display_list[0].opacity(), 1.0);
    assert_eq!(ctx.stack_depth(), 0);
}

#[test_log::test]
fn disabled_frame_hides_its_subtree() {
    let mut m = offline_manager();
    m.add_grid_layer("Earth", "Earth grid").unwrap();
    m.add_grid_layer("Moon", "Moon grid").unwrap();
    assert!(m.set_frame_enabled("Earth", false));

    let mut ctx = m.render_context(jd(2024, 6, 1, 0));
    m.draw(&mut ctx, 1.0, false, "Sun", true, false);
    assert!(grids(&ctx).is_empty());
    m.draw(&mut ctx, 1.0, false, "Earth", true, false);
    assert!(ctx.display_list.is_empty());

    m.set_frame_enabled("Earth", true);
    m.draw(&mut ctx, 1.0, false, "Sun", true, false);
    assert_eq!(grids(&ctx).len(), 2);
}

#[test_log::test]
fn unknown_frame_draws_nothing() {
    let mut m = offline_manager();
    let mut ctx = m.render_context(jd(2024, 6, 1, 0));
    m.draw(&mut ctx, 1.0, false, "Atlantis", true, false);
    assert!(ctx.display_list.is_empty());
    assert_eq!(ctx.stack_depth(), 0);
}

#[test_log::test]
fn images_draw_before_overlays() {
    let mut m = offline_manager();
    m.add_grid_layer("Sky", "grid").unwrap();
    m.add_image_set_layer(ImageSet::new("DSS", "http://tiles/dss", DataSetType::Sky), "Sky")
        .unwrap();

    let mut ctx = m.render_context(jd(2024, 6, 1, 0));
    m.draw(&mut ctx, 1.0, true, "Sky", true, false);
    assert_eq!(ctx.display_list.len(), 2);
    assert!(ctx.display_list[0].is_image_set());
    assert!(matches!(ctx.display_list[1], DrawCommand::Grid { .. }));
}

#[test_log::test]
fn fade_in_scales_opacity() {
    let mut m = offline_manager();
    let id = m.add_grid_layer("Earth", "grid").unwrap();
    {
        let common = m.layer_mut(&id).unwrap().common_mut();
        common.set_start_time(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
        common.set_end_time(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        common.set_fade_span(Duration::days(1));
        common.set_fade_type(FadeType::In);
    }

    let opacity_at = |m: &mut LayerManager, jd_now: f64| {
        let mut ctx = m.render_context(jd_now);
        m.draw(&mut ctx, 1.0, false, "Earth", true, false);
        let opacity = grids(&ctx).first().map(|c| c.opacity());
        opacity
    };

    assert_eq!(opacity_at(&mut m, jd(2024, 5, 31, 0)), None);
    assert_relative_eq!(opacity_at(&mut m, jd(2024, 6, 1, 12)).unwrap(), 0.5, epsilon = 1e-6);
    assert_relative_eq!(opacity_at(&mut m, jd(2024, 6, 3, 0)).unwrap(), 1.0);
    assert_eq!(opacity_at(&mut m, jd(2031, 1, 1, 0)), None);
}

#[test_log::test]
fn body_placement_positions_layers() {
    let mut m = offline_manager();
    m.add_grid_layer("Earth", "grid").unwrap();
    let placed = Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0));

    let mut ctx = m.render_context(jd(2024, 6, 1, 0));
    ctx.body_placements.insert(
        "Earth".to_string(),
        BodyPlacement {
            world: placed,
            world_base: placed,
            world_base_non_rotating: placed,
            nominal_radius: 6_371_000.0,
        },
    );
    m.draw(&mut ctx, 1.0, false, "Sun", true, false);
    assert_eq!(*grids(&ctx)[0].world(), placed);
    assert_eq!(ctx.world, Matrix4::identity());
}

#[test_log::test]
fn tour_merge_overwrites_live_layer() {
    let mut m = offline_manager();
    let live_id = m.add_grid_layer("Earth", "live copy").unwrap();

    m.set_tour_layers(true);
    let mut tour_grid = GridLayer::new("tour copy", "Earth");
    tour_grid.common_mut().set_id(live_id.clone());
    assert!(m.add(Box::new(tour_grid), true));
    assert!(m.create_layer_group("Earth", "Tour group"));
    m.add_grid_layer("Tour group", "grouped").unwrap();

    m.merge_tours_layers();

    assert!(!m.tour_layers());
    assert!(m.tour().is_empty());
    let earth_layers = m.layers_in("Earth");
    assert_eq!(earth_layers, vec![live_id.clone()]);
    let merged = m.layer(&live_id).unwrap();
    assert_eq!(merged.common().name(), "tour copy");
    assert!(merged.common().loaded_from_tour);
    assert!(m.layer_map("Tour group").unwrap().loaded_from_tour);
    assert_eq!(m.layers_in("Tour group").len(), 1);
    assert!(m.is_consistent());
}

#[test_log::test]
fn saved_layers_load_into_tour_and_merge() {
    let mut m = offline_manager();
    m.create_layer_group("Mars", "Landers");
    let grid = m.add_grid_layer("Landers", "sites").unwrap();
    let text = m.save_layers_to_xml("Mars").unwrap();

    let mut other = offline_manager();
    assert_eq!(other.load_layers_from_xml(&text, true).unwrap(), 1);
    assert!(other.layer(&grid).is_none());
    assert!(other.tour().contains_layer(&grid));

    other.merge_tours_layers();
    assert!(other.layer(&grid).is_some());
    assert_eq!(other.frame("Landers").unwrap().parent, "Mars");
    assert!(other.is_consistent());
}

#[test_log::test]
fn structural_edits_raise_version() {
    let mut m = offline_manager();
    let mut last = m.version();
    let mut check = |m: &LayerManager| {
        assert!(m.version() > last, "version did not increase");
        last = m.version();
        assert!(m.is_consistent());
    };

    let id = m.add_grid_layer("Earth", "a").unwrap();
    check(&m);
    m.create_layer_group("Earth", "Group");
    check(&m);
    m.add_grid_layer("Group", "b").unwrap();
    check(&m);
    m.move_layer(&id, wwt_layers::MoveTo::Bottom);
    m.add_grid_layer("Earth", "c").unwrap();
    check(&m);
    m.delete_frame("Group");
    check(&m);
    m.delete_layer_by_id(&id, true, true);
    check(&m);
    m.set_tour_layers(true);
    check(&m);
    m.set_tour_layers(false);
    check(&m);
    m.clear_layers();
    check(&m);
}

#[test_log::test]
fn moons_and_iss_arrive_through_poll() {
    let settings = EngineSettings::default();
    let moon_text = format!(
        "Planet\tEpoch\tName\n{}\n{}\n{}\n",
        moon_row("Mars", "Phobos", "9376"),
        moon_row("Mars", "Deimos", "23458"),
        moon_row("Vulcan", "Nowhere", "1000"),
    );
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_response(&settings.moon_file_url, &moon_text)
            .with_response(&settings.iss_tle_url, &format!("ISS (ZARYA)\n{ISS_LINE1}\n{ISS_LINE2}\n")),
    );
    let mut m = LayerManager::with_fetcher(settings, fetcher.clone());
    m.init_layers();
    assert!(m.frame("Phobos").is_none());

    assert_eq!(m.poll_fetches(), 2);
    assert_eq!(m.moon_file_state(), &FetchState::Loaded);
    assert_eq!(m.iss_state(), &FetchState::Loaded);
    assert_eq!(m.layer_map("Mars").unwrap().child_maps, vec!["Phobos", "Deimos"]);
    assert!(m.frame("Nowhere").is_none());
    assert_relative_eq!(m.frame("ISS").unwrap().inclination, 51.6416);

    m.init_layers();
    assert_eq!(m.poll_fetches(), 0);
    assert!(m.frame("Deimos").is_some());
    assert_relative_eq!(m.frame("ISS").unwrap().inclination, 51.6416);
    assert_eq!(fetcher.requests().len(), 2);
    assert!(m.is_consistent());
}

#[test_log::test]
fn moon_orbits_draw_under_their_planet() {
    let settings = EngineSettings::default();
    let fetcher = MemoryFetcher::new().with_response(
        &settings.moon_file_url,
        &moon_row("Mars", "Phobos", "9376"),
    );
    let mut m = LayerManager::with_fetcher(settings, Arc::new(fetcher));
    m.init_layers();
    m.poll_fetches();

    let mut ctx = m.render_context(jd(2024, 6, 1, 0));
    m.draw(&mut ctx, 1.0, false, "Mars", true, false);
    let orbits: Vec<&str> = ctx
        .display_list
        .iter()
        .filter_map(|c| match c {
            DrawCommand::Orbit { frame, .. } => Some(frame.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(orbits, vec!["Phobos"]);
}

#[test_log::test]
fn deleting_a_group_removes_every_level_below_it() {
    let mut m = offline_manager();
    assert!(m.create_layer_group("Earth", "Stations"));
    assert!(m.create_layer_group("Stations", "Pads"));
    assert!(m.create_layer_group("Pads", "Cranes"));
    let kept = m.add_grid_layer("Earth", "kept").unwrap();
    let ids: Vec<_> = ["Stations", "Pads", "Cranes"]
        .iter()
        .map(|frame| m.add_grid_layer(frame, "grid").unwrap())
        .collect();
    let before = m.live().layer_count();

    assert!(m.delete_frame("Stations"));
    for frame in ["Stations", "Pads", "Cranes"] {
        assert!(m.layer_map(frame).is_none(), "{frame} survived");
    }
    assert!(ids.iter().all(|id| m.layer(id).is_none()));
    assert!(m.layer(&kept).is_some());
    assert_eq!(m.live().layer_count(), before - ids.len());
    assert!(m.is_consistent());
}

#[test_log::test]
fn emptying_a_planet_keeps_it_but_drops_its_moons() {
    let mut m = offline_manager();
    assert!(m.create_layer_group("Moon", "Apollo"));
    let on_apollo = m.add_grid_layer("Apollo", "sites").unwrap();
    let on_mars = m.add_grid_layer("Mars", "grid").unwrap();

    m.purge_layer_map_deep("Earth", false);
    assert!(m.layer_map("Earth").unwrap().child_maps.is_empty());
    assert!(m.layer_map("Moon").is_none());
    assert!(m.layer_map("Apollo").is_none());
    assert!(m.layer(&on_apollo).is_none());
    assert!(m.layer(&on_mars).is_some());
    assert!(m.is_consistent());

    m.add_grid_layer("Earth", "fresh").unwrap();
    assert!(m.is_consistent());
}

#[test_log::test]
fn loaded_frames_without_a_parent_are_dropped() {
    let mut source = offline_manager();
    source.create_layer_group("Mars", "Base");
    source.create_layer_group("Base", "Landers");
    source.add_grid_layer("Landers", "sites").unwrap();
    let text = source.save_layers_to_xml("Landers").unwrap();

    let mut m = offline_manager();
    let before = m.live().layer_count();
    assert_eq!(m.load_layers_from_xml(&text, false).unwrap(), 0);
    assert!(m.layer_map("Landers").is_none());
    assert_eq!(m.live().layer_count(), before);
    assert!(m.is_consistent());
    assert!(m.connect_all_children().is_empty());
}
