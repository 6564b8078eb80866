use playlist_merge::api::mock::{Call, Failure, MockCatalog};
use playlist_merge::error::Error;
use playlist_merge::merge::{MergeOrchestrator, MergeSettings, MergeSnapshot, MergeStatus};
use playlist_merge::models::{Selection, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

fn track(uri: &str, name: &str) -> Track {
    Track {
        uri: uri.into(),
        name: name.into(),
        primary_artist: "Artist".into(),
        album: "Album".into(),
    }
}

fn numbered(prefix: &str, n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| track(&format!("spotify:track:{}{}", prefix, i), &format!("{} song {}", prefix, i)))
        .collect()
}

fn orchestrator(mock: &Arc<MockCatalog>) -> MergeOrchestrator {
    MergeOrchestrator::new(mock.clone(), "u1", MergeSettings::default())
}

fn drain(rx: &mut Receiver<MergeSnapshot>) -> Vec<MergeSnapshot> {
    let mut out = Vec::new();
    while let Ok(s) = rx.try_recv() {
        out.push(s);
    }
    out
}

#[tokio::test]
async fn two_overlapping_playlists_merge_into_four_tracks() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist(
                "p1",
                "Road",
                vec![track("u:a", "A"), track("u:b", "B"), track("u:c", "C")],
            )
            .with_playlist(
                "p2",
                "Gym",
                // same songs as b and c under other uris, plus d
                vec![track("u:b2", " b "), track("u:c2", "C"), track("u:d", "D")],
            ),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1", "p2"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Success);
    assert_eq!(done.progress, 100);
    assert!(done.message.starts_with("Successfully merged 4 tracks into \"Merged Playlist - "));
    assert_eq!(
        done.result_url.as_deref(),
        Some("https://open.spotify.com/playlist/mock-merged")
    );
    assert_eq!(mock.create_calls(), 1);
    assert_eq!(mock.add_batches(), vec![vec!["u:a", "u:b", "u:c", "u:d"]]);
    assert!(selection.is_empty(), "selection is cleared on success");

    let create = mock
        .calls()
        .into_iter()
        .find(|c| matches!(c, Call::CreatePlaylist { .. }))
        .unwrap();
    match create {
        Call::CreatePlaylist { description, .. } => assert_eq!(description, "Merged from 2 playlists."),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn only_local_tracks_end_in_no_tracks_error() {
    // Local entries never decode into tracks, so the catalog reports none.
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "Local A", vec![])
            .with_playlist("p2", "Local B", vec![]),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1", "p2"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert_eq!(done.message, "No valid tracks found in selected playlists.");
    assert_eq!(done.progress, 0);
    assert!(!done.reauth_required);
    assert_eq!(mock.create_calls(), 0);
    assert_eq!(selection.len(), 2, "selection is kept on failure");
}

#[tokio::test]
async fn unauthorized_on_second_add_call_stops_the_job() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "Big", numbered("x", 250))
            .fail_add_call(2, Failure::Unauthorized),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert!(done.reauth_required);
    assert_eq!(done.progress, 0);
    assert_eq!(mock.add_batches().len(), 2);
}

#[tokio::test]
async fn unauthorized_while_fetching_issues_no_writes() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 3))
            .with_playlist("p2", "Two", numbered("b", 3))
            .with_playlist("p3", "Three", numbered("c", 3))
            .with_playlist("p4", "Four", numbered("d", 3))
            .fail_tracks("p2", Failure::Unauthorized),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1", "p2", "p3", "p4"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert!(done.reauth_required);
    assert_eq!(mock.create_calls(), 0);
    assert!(mock.add_batches().is_empty());
    // p4 belongs to the second group, which never starts
    assert!(!mock.calls().contains(&Call::PlaylistTracks("p4".into())));
}

#[tokio::test]
async fn remote_error_is_reported_without_reauth() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 3))
            .fail_create(Failure::Remote(500)),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert!(!done.reauth_required);
    assert!(done.message.contains("500"));
    assert!(mock.add_batches().is_empty());
}

#[tokio::test]
async fn add_batches_cover_every_track_once_in_order() {
    let mock = Arc::new(MockCatalog::new("u1").with_playlist("p1", "Big", numbered("x", 250)));
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1"]);
    let mut orch = orchestrator(&mock);

    orch.run(&mut selection, &playlists).await.unwrap();

    let batches = mock.add_batches();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![100, 100, 50]);
    let flat: Vec<String> = batches.into_iter().flatten().collect();
    let expected: Vec<String> = numbered("x", 250).into_iter().map(|t| t.uri).collect();
    assert_eq!(flat, expected);
}

#[tokio::test]
async fn fetches_run_in_groups_of_three() {
    let mut mock = MockCatalog::new("u1").with_fetch_delay(Duration::from_millis(30));
    for i in 0..7 {
        mock = mock.with_playlist(&format!("p{}", i), &format!("List {}", i), numbered(&format!("l{}-", i), 2));
    }
    let mock = Arc::new(mock);
    let playlists = mock.playlist_refs();
    let mut selection = Selection::new();
    selection.toggle_all(&playlists);
    let mut orch = orchestrator(&mock);
    let mut rx = orch.subscribe();

    let done = orch.run(&mut selection, &playlists).await.unwrap();
    assert_eq!(done.status, MergeStatus::Success);
    assert!(mock.max_concurrent_fetches() > 1);
    assert!(mock.max_concurrent_fetches() <= 3);

    // 7 playlists -> 3 groups; progress after each group is 10 + done/3*50
    let fetched: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter(|s| s.message.starts_with("Fetched tracks from"))
        .map(|s| s.progress)
        .collect();
    assert_eq!(fetched, vec![26, 43, 60]);
}

#[tokio::test]
async fn next_group_waits_for_the_slowest_member() {
    let mut mock = MockCatalog::new("u1")
        .with_fetch_delay(Duration::from_millis(5))
        .with_playlist_delay("p0", Duration::from_millis(150));
    for i in 0..6 {
        mock = mock.with_playlist(&format!("p{}", i), &format!("List {}", i), numbered(&format!("l{}-", i), 2));
    }
    let mock = Arc::new(mock);
    let playlists = mock.playlist_refs();
    let mut selection = Selection::new();
    selection.toggle_all(&playlists);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();
    assert_eq!(done.status, MergeStatus::Success);

    let calls = mock.calls();
    let pos = |c: Call| calls.iter().position(|x| *x == c).unwrap();
    let last_first_group_done = ["p0", "p1", "p2"]
        .iter()
        .map(|id| pos(Call::PlaylistTracksDone(id.to_string())))
        .max()
        .unwrap();
    assert_eq!(last_first_group_done, pos(Call::PlaylistTracksDone("p0".into())));
    for id in ["p3", "p4", "p5"] {
        assert!(
            pos(Call::PlaylistTracks(id.to_string())) > last_first_group_done,
            "{} started before the first group finished",
            id
        );
    }
}

#[tokio::test]
async fn rate_limited_fetch_ends_in_error_without_writes() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 3))
            .with_playlist("p2", "Two", numbered("b", 3))
            .fail_tracks("p2", Failure::RateLimited),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1", "p2"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert_eq!(done.progress, 0);
    assert!(!done.reauth_required);
    assert!(done.message.contains("Rate limited"), "{}", done.message);
    assert_eq!(mock.create_calls(), 0);
    assert!(mock.add_batches().is_empty());
}

#[tokio::test]
async fn rate_limited_create_ends_in_error_without_adds() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 3))
            .fail_create(Failure::RateLimited),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1"]);
    let mut orch = orchestrator(&mock);

    let done = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(done.status, MergeStatus::Error);
    assert_eq!(done.progress, 0);
    assert!(!done.reauth_required);
    assert_eq!(mock.create_calls(), 1);
    assert!(mock.add_batches().is_empty());
}

#[tokio::test]
async fn progress_is_monotonic_with_one_terminal_snapshot() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 120))
            .with_playlist("p2", "Two", numbered("b", 90)),
    );
    let playlists = mock.playlist_refs();
    let mut selection = Selection::from_ids(["p1", "p2"]);
    let mut orch = orchestrator(&mock);
    let mut rx = orch.subscribe();

    orch.run(&mut selection, &playlists).await.unwrap();
    let events = drain(&mut rx);

    let statuses: Vec<MergeStatus> = events.iter().map(|s| s.status).collect();
    assert_eq!(statuses.first(), Some(&MergeStatus::FetchingTracks));
    assert!(statuses.contains(&MergeStatus::CreatingPlaylist));
    assert!(statuses.contains(&MergeStatus::AddingTracks));
    assert_eq!(statuses.iter().filter(|s| s.is_terminal()).count(), 1);
    assert_eq!(statuses.last(), Some(&MergeStatus::Success));
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert_eq!(orch.snapshot(), events.last().unwrap());
}

#[tokio::test]
async fn rerun_requires_acknowledge_and_starts_fresh() {
    let mock = Arc::new(
        MockCatalog::new("u1")
            .with_playlist("p1", "One", numbered("a", 2))
            .with_playlist("p2", "Two", numbered("b", 2)),
    );
    let playlists = mock.playlist_refs();
    let mut orch = orchestrator(&mock);

    let mut selection = Selection::from_ids(["p1", "p2"]);
    orch.run(&mut selection, &playlists).await.unwrap();
    assert_eq!(orch.status(), MergeStatus::Success);

    let mut again = Selection::from_ids(["p1"]);
    match orch.run(&mut again, &playlists).await {
        Err(Error::NotIdle(MergeStatus::Success)) => {}
        other => panic!("expected NotIdle, got {:?}", other),
    }

    orch.acknowledge();
    assert_eq!(orch.status(), MergeStatus::Idle);
    let done = orch.run(&mut again, &playlists).await.unwrap();
    assert_eq!(done.status, MergeStatus::Success);
    assert_eq!(mock.create_calls(), 2);
    assert!(done.message.starts_with("Successfully merged 2 tracks"));
}

#[tokio::test]
async fn empty_selection_stays_idle() {
    let mock = Arc::new(MockCatalog::new("u1").with_playlist("p1", "One", numbered("a", 2)));
    let playlists = mock.playlist_refs();
    let mut orch = orchestrator(&mock);
    let mut selection = Selection::from_ids(["missing"]);

    let snap = orch.run(&mut selection, &playlists).await.unwrap();

    assert_eq!(snap.status, MergeStatus::Idle);
    assert!(mock.calls().is_empty());
}
