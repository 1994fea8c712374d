use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;

use mri_catalog::hierarchy::{Modality, Project, Run, Session, Subject};
use mri_catalog::store::{CacheState, CachedCatalog, Store};

fn project_with_run(echo_time: f64) -> Project {
    let mut run = Run::new("sub-01_T1w.json");
    run.merge(
        [
            ("EchoTime".to_string(), json!(echo_time)),
            ("ImageType".to_string(), json!(["ORIGINAL", "PRIMARY"])),
        ]
        .into(),
    );
    let mut session = Session::new("ses-01");
    session.attach(run).unwrap();
    let mut subject = Subject::new("sub-01");
    subject.attach(session).unwrap();
    let mut modality = Modality::new("anat");
    modality.attach(subject).unwrap();
    let mut project = Project::new("demo");
    project.attach(modality).unwrap();
    project
}

#[test]
fn round_trip_preserves_structure() {
    let temp = tempfile::tempdir().unwrap();
    let store =
        Store::new_with_root(Utf8PathBuf::from_path_buf(temp.path().join("meta")).unwrap());
    let path = store.cache_path("demo");
    let project = project_with_run(0.12345);

    store
        .persist(&path, &CachedCatalog::new(Utf8Path::new("/data"), project.clone()))
        .unwrap();
    let loaded = Store::load(&path).unwrap();
    assert_eq!(loaded.project, project);
    assert_eq!(loaded.dataset, "demo");
}

#[test]
fn persist_overwrites_previous_catalog() {
    let temp = tempfile::tempdir().unwrap();
    let store =
        Store::new_with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let path = store.cache_path("demo");

    store
        .persist(&path, &CachedCatalog::new(Utf8Path::new("/data"), project_with_run(0.01)))
        .unwrap();
    store
        .persist(&path, &CachedCatalog::new(Utf8Path::new("/data"), project_with_run(0.02)))
        .unwrap();

    assert_eq!(store.state("demo"), CacheState::Warm);
    let loaded = Store::load(&path).unwrap();
    let (_, run) = loaded.project.runs().next().unwrap();
    assert_eq!(run.echo_time(), 0.02);
}
