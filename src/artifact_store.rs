use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::PipelineError;
use crate::splitter::{Split, TargetScaler};

pub const REGISTRY_FILE: &str = "artifacts.sqlite";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Transformed,
    Prepared,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Transformed => "transformed",
            ArtifactKind::Prepared => "prepared",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width version id: microseconds since the epoch, zero padded to 20
/// digits so lexicographic and chronological order agree.
pub fn version_from_micros(micros: i64) -> String {
    format!("{:020}", micros.max(0))
}

/// The four training arrays plus unscaled test targets, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedArrays {
    pub lookback: usize,
    pub features: usize,
    pub x_train: Vec<f32>,
    pub y_train: Vec<f32>,
    pub x_test: Vec<f32>,
    pub y_test: Vec<f32>,
    pub y_test_raw: Vec<f32>,
}

impl PreparedArrays {
    pub fn from_split(split: &Split, lookback: usize, features: usize) -> Self {
        let flatten = |windows: &[crate::sequence::NormalizedWindow]| -> Vec<f32> {
            windows
                .iter()
                .flat_map(|w| w.values.iter().map(|v| *v as f32))
                .collect()
        };
        let to_f32 = |v: &[f64]| -> Vec<f32> { v.iter().map(|x| *x as f32).collect() };
        Self {
            lookback,
            features,
            x_train: flatten(&split.train),
            y_train: to_f32(&split.y_train),
            x_test: flatten(&split.test),
            y_test: to_f32(&split.y_test),
            y_test_raw: to_f32(&split.y_test_raw),
        }
    }

    pub fn train_windows(&self) -> usize {
        self.y_train.len()
    }

    pub fn test_windows(&self) -> usize {
        self.y_test.len()
    }

    /// `(windows, lookback, features)` for the training features.
    pub fn train_shape(&self) -> (usize, usize, usize) {
        (self.train_windows(), self.lookback, self.features)
    }

    pub fn test_shape(&self) -> (usize, usize, usize) {
        (self.test_windows(), self.lookback, self.features)
    }

    /// Summary statistics for each stored array, in storage order.
    pub fn stats(&self) -> [(&'static str, ArrayStats); 5] {
        [
            ("x_train", ArrayStats::of(&self.x_train)),
            ("y_train", ArrayStats::of(&self.y_train)),
            ("x_test", ArrayStats::of(&self.x_test)),
            ("y_test", ArrayStats::of(&self.y_test)),
            ("y_test_raw", ArrayStats::of(&self.y_test_raw)),
        ]
    }
}

/// Range and mean over the finite entries of an array; NaN when there are none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayStats {
    pub len: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub non_finite: usize,
}

impl ArrayStats {
    pub fn of(values: &[f32]) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut finite = 0usize;
        for v in values.iter().copied().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            finite += 1;
        }
        if finite == 0 {
            min = f32::NAN;
            max = f32::NAN;
        }
        Self {
            len: values.len(),
            min,
            max,
            mean: if finite == 0 { f64::NAN } else { sum / finite as f64 },
            non_finite: values.len() - finite,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedArtifact {
    pub version: String,
    pub manifest_version: u32,
    pub arrays: PreparedArrays,
    pub scaler: TargetScaler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedArtifact {
    pub version: String,
    pub manifest_version: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Transformed(TransformedArtifact),
    Prepared(PreparedArtifact),
}

/// SQLite registry of versioned artifacts under the storage root.
pub struct ArtifactStore {
    conn: Connection,
}

fn encode_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl ArtifactStore {
    pub fn open(root: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(root)?;
        let conn = Connection::open(root.join(REGISTRY_FILE))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifact_versions (
                kind TEXT NOT NULL,
                version TEXT NOT NULL,
                manifest_version INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL,
                path TEXT,
                PRIMARY KEY(kind, version)
            );

            CREATE TABLE IF NOT EXISTS prepared_arrays (
                version TEXT NOT NULL,
                name TEXT NOT NULL,
                len INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY(version, name)
            );

            CREATE TABLE IF NOT EXISTS prepared_shapes (
                version TEXT PRIMARY KEY,
                lookback INTEGER NOT NULL,
                features INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS target_scalers (
                version TEXT PRIMARY KEY,
                mean REAL NOT NULL,
                scale REAL NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn latest_version(&self, kind: ArtifactKind) -> Result<Option<String>, PipelineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT MAX(version) FROM artifact_versions WHERE kind = ?1")?;
        let latest = stmt.query_row([kind.as_str()], |row| row.get::<_, Option<String>>(0))?;
        Ok(latest)
    }

    /// A timestamp-derived id strictly greater than every existing id of `kind`.
    pub fn next_version(&self, kind: ArtifactKind) -> Result<String, PipelineError> {
        let now = chrono::Utc::now().timestamp_micros();
        let floor = self
            .latest_version(kind)?
            .and_then(|v| v.parse::<i64>().ok())
            .map(|v| v + 1)
            .unwrap_or(0);
        Ok(version_from_micros(now.max(floor)))
    }

    fn exists(&self, kind: ArtifactKind, version: &str) -> Result<bool, PipelineError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM artifact_versions WHERE kind = ?1 AND version = ?2",
                params![kind.as_str(), version],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn ensure_new(&self, kind: ArtifactKind, version: &str) -> Result<(), PipelineError> {
        if self.exists(kind, version)? {
            return Err(PipelineError::VersionExists {
                kind: kind.to_string(),
                version: version.to_string(),
            });
        }
        Ok(())
    }

    pub fn register_transformed(
        &mut self,
        version_id: &str,
        path: &Path,
        manifest_version: u32,
    ) -> Result<(), PipelineError> {
        self.ensure_new(ArtifactKind::Transformed, version_id)?;
        self.conn.execute(
            r#"
            INSERT INTO artifact_versions (kind, version, manifest_version, created_at_ms, path)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                ArtifactKind::Transformed.as_str(),
                version_id,
                manifest_version,
                chrono::Utc::now().timestamp_millis(),
                path.to_string_lossy().into_owned(),
            ],
        )?;
        tracing::info!(version = version_id, path = %path.display(), "Transformed artifact registered");
        Ok(())
    }

    /// Persist a prepared artifact. Versions are write-once.
    pub fn save(
        &mut self,
        version_id: &str,
        arrays: &PreparedArrays,
        scaler: &TargetScaler,
        manifest_version: u32,
    ) -> Result<(), PipelineError> {
        self.ensure_new(ArtifactKind::Prepared, version_id)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO artifact_versions (kind, version, manifest_version, created_at_ms, path)
            VALUES (?1, ?2, ?3, ?4, NULL)
            "#,
            params![
                ArtifactKind::Prepared.as_str(),
                version_id,
                manifest_version,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        tx.execute(
            "INSERT INTO prepared_shapes (version, lookback, features) VALUES (?1, ?2, ?3)",
            params![version_id, arrays.lookback as i64, arrays.features as i64],
        )?;
        for (name, data) in [
            ("x_train", &arrays.x_train),
            ("y_train", &arrays.y_train),
            ("x_test", &arrays.x_test),
            ("y_test", &arrays.y_test),
            ("y_test_raw", &arrays.y_test_raw),
        ] {
            tx.execute(
                "INSERT INTO prepared_arrays (version, name, len, data) VALUES (?1, ?2, ?3, ?4)",
                params![version_id, name, data.len() as i64, encode_f32(data)],
            )?;
        }
        tx.execute(
            "INSERT INTO target_scalers (version, mean, scale) VALUES (?1, ?2, ?3)",
            params![version_id, scaler.mean, scaler.scale],
        )?;
        tx.commit()?;

        tracing::info!(
            version = version_id,
            train = arrays.train_windows(),
            test = arrays.test_windows(),
            lookback = arrays.lookback,
            features = arrays.features,
            "Prepared artifact saved"
        );
        Ok(())
    }

    pub fn load_latest(&self, kind: ArtifactKind) -> Result<Option<Artifact>, PipelineError> {
        let Some(version) = self.latest_version(kind)? else {
            return Ok(None);
        };
        let artifact = match kind {
            ArtifactKind::Transformed => self.load_transformed(&version)?.map(Artifact::Transformed),
            ArtifactKind::Prepared => self.load_prepared(&version)?.map(Artifact::Prepared),
        };
        Ok(artifact)
    }

    pub fn load_transformed(&self, version: &str) -> Result<Option<TransformedArtifact>, PipelineError> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT manifest_version, path FROM artifact_versions
                WHERE kind = ?1 AND version = ?2
                "#,
                params![ArtifactKind::Transformed.as_str(), version],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(manifest_version, path)| {
            path.map(|p| TransformedArtifact {
                version: version.to_string(),
                manifest_version,
                path: PathBuf::from(p),
            })
        }))
    }

    pub fn load_prepared(&self, version: &str) -> Result<Option<PreparedArtifact>, PipelineError> {
        let manifest_version = self
            .conn
            .query_row(
                "SELECT manifest_version FROM artifact_versions WHERE kind = ?1 AND version = ?2",
                params![ArtifactKind::Prepared.as_str(), version],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        let Some(manifest_version) = manifest_version else {
            return Ok(None);
        };

        let (lookback, features) = self.conn.query_row(
            "SELECT lookback, features FROM prepared_shapes WHERE version = ?1",
            [version],
            |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as usize)),
        )?;
        let scaler = self.conn.query_row(
            "SELECT mean, scale FROM target_scalers WHERE version = ?1",
            [version],
            |row| {
                Ok(TargetScaler {
                    mean: row.get(0)?,
                    scale: row.get(1)?,
                })
            },
        )?;

        let load = |name: &str| -> Result<Vec<f32>, PipelineError> {
            let data: Vec<u8> = self.conn.query_row(
                "SELECT data FROM prepared_arrays WHERE version = ?1 AND name = ?2",
                params![version, name],
                |row| row.get(0),
            )?;
            Ok(decode_f32(&data))
        };

        Ok(Some(PreparedArtifact {
            version: version.to_string(),
            manifest_version,
            arrays: PreparedArrays {
                lookback,
                features,
                x_train: load("x_train")?,
                y_train: load("y_train")?,
                x_test: load("x_test")?,
                y_test: load("y_test")?,
                y_test_raw: load("y_test_raw")?,
            },
            scaler,
        }))
    }
}
