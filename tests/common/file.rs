use assert_fs::TempDir;
use derive_new::new;
use rstest::fixture;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct FileSpec {
    pub path: PathBuf,
    pub content: String,
}

pub fn write_file(file_spec: FileSpec) {
    // make sure the parent directory exists
    if let Some(parent) = file_spec.path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("Failed to create directory {:?}: {}", parent, e));
    }

    std::fs::write(&file_spec.path, &file_spec.content)
        .unwrap_or_else(|e| panic!("Failed to write file {:?}: {}", file_spec.path, e));
}

/// Write `files_count` files with generated names and contents directly under `dir`
pub fn write_generated_files(dir: &Path, files_count: usize) -> Vec<FileSpec> {
    use fake::{
        Fake,
        faker::lorem::en::{Word, Words},
    };

    (0..files_count)
        .map(|index| {
            // the index keeps generated names unique
            let file_name = format!("{}-{index}.txt", Word().fake::<String>());
            let file_path = dir.join(&file_name);
            let file_content = Words(5..10).fake::<Vec<String>>().join(" ");

            let file_spec = FileSpec::new(file_path, file_content);
            write_file(file_spec.clone());

            file_spec
        })
        .collect::<Vec<_>>()
}

#[fixture]
pub fn upload_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// `{a.txt, b/ignored.log, b/keep.txt}`
#[fixture]
pub fn project_dir(upload_dir: TempDir) -> TempDir {
    write_file(FileSpec::new(upload_dir.path().join("a.txt"), "alpha\n".to_string()));
    write_file(FileSpec::new(
        upload_dir.path().join("b").join("ignored.log"),
        "noise\n".to_string(),
    ));
    write_file(FileSpec::new(
        upload_dir.path().join("b").join("keep.txt"),
        "keep me\n".to_string(),
    ));

    upload_dir
}
