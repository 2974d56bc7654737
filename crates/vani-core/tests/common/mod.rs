// Shared fixtures: a deterministic fake model backend and artifact layout helpers
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use vani_core::model::{AcousticArtifacts, VocoderArtifacts};
use vani_core::pipeline::to_pcm16;
use vani_core::{AcousticModel, ComputeDevice, Gender, MelFrames, ModelBackend, ModelKey, Vocoder};

pub const MODEL_FILES: [&str; 5] = [
    "config.yaml",
    "model.pth",
    "feats_stats.npz",
    "pitch_stats.npz",
    "energy_stats.npz",
];

pub const VOCODER_FILES: [&str; 2] = ["config.json", "generator"];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Frames per character for a given speed factor
fn frames_per_char(alpha: f32) -> usize {
    (alpha * 2.0).round().max(1.0) as usize
}

fn char_level(c: char) -> f32 {
    (c as u32 % 64) as f32 / 64.0
}

/// PCM the fake backend produces for one chunk of already-normalized text
pub fn expected_pcm(text: &str, alpha: f32) -> Vec<i16> {
    let samples: Vec<f32> = text
        .chars()
        .flat_map(|c| std::iter::repeat(char_level(c)).take(frames_per_char(alpha)))
        .collect();
    to_pcm16(&samples)
}

/// Fake backend: acoustic frames encode the text, the vocoder flattens them
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub acoustic_loads: AtomicUsize,
    pub vocoder_loads: AtomicUsize,
    pub load_delay: Duration,
    pub fail_loads: bool,
    pub chunk_delays: HashMap<String, Duration>,
    pub fail_on_text: Option<String>,
    pub gpu: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    pub fn with_chunk_delay(mut self, text: &str, delay: Duration) -> Self {
        self.chunk_delays.insert(text.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on_text = Some(text.to_string());
        self
    }

    pub fn loads(&self) -> usize {
        self.acoustic_loads.load(Ordering::SeqCst)
    }
}

impl ModelBackend for FakeBackend {
    fn select_device(&self, requested: ComputeDevice) -> ComputeDevice {
        if self.gpu {
            requested
        } else {
            ComputeDevice::Cpu
        }
    }

    fn load_acoustic(
        &self,
        _key: &ModelKey,
        artifacts: &AcousticArtifacts,
        _device: ComputeDevice,
    ) -> anyhow::Result<Box<dyn AcousticModel>> {
        self.acoustic_loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if self.fail_loads {
            bail!("corrupt checkpoint {}", artifacts.weights.display());
        }
        Ok(Box::new(FakeAcoustic {
            delays: self.chunk_delays.clone(),
            fail_on_text: self.fail_on_text.clone(),
        }))
    }

    fn load_vocoder(
        &self,
        _key: &ModelKey,
        _artifacts: &VocoderArtifacts,
        _device: ComputeDevice,
    ) -> anyhow::Result<Box<dyn Vocoder>> {
        self.vocoder_loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeVocoder))
    }
}

#[derive(Debug)]
struct FakeAcoustic {
    delays: HashMap<String, Duration>,
    fail_on_text: Option<String>,
}

impl AcousticModel for FakeAcoustic {
    fn synthesize(&self, text: &str, alpha: f32) -> anyhow::Result<MelFrames> {
        if let Some(delay) = self.delays.get(text) {
            std::thread::sleep(*delay);
        }
        if let Some(bad) = &self.fail_on_text {
            if text.contains(bad.as_str()) {
                bail!("acoustic model rejected '{text}'");
            }
        }
        Ok(text
            .chars()
            .flat_map(|c| std::iter::repeat(vec![char_level(c)]).take(frames_per_char(alpha)))
            .collect())
    }
}

#[derive(Debug)]
struct FakeVocoder;

impl Vocoder for FakeVocoder {
    fn vocode(&self, mel: &MelFrames) -> anyhow::Result<Vec<f32>> {
        Ok(mel.iter().flatten().copied().collect())
    }
}

fn write_files(dir: &Path, files: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in files {
        std::fs::write(dir.join(name), b"artifact").unwrap();
    }
}

/// `<root>/<language>/<gender>/model/*`
pub fn write_local_model(root: &Path, language: &str, gender: Gender) {
    write_files(&root.join(language).join(gender.as_str()).join("model"), &MODEL_FILES);
}

/// `<root>/vocoder/<gender>/<group>/*`
pub fn write_local_vocoder(root: &Path, gender: Gender, group: &str) {
    write_files(&root.join("vocoder").join(gender.as_str()).join(group), &VOCODER_FILES);
}

pub fn write_local_pair(root: &Path, language: &str, gender: Gender) {
    write_local_model(root, language, gender);
    write_local_vocoder(root, gender, language);
}

pub async fn put_files(store: &InMemory, prefix: &ObjectPath, files: &[&str]) {
    for name in files {
        let payload = PutPayload::from(format!("{prefix}/{name}").into_bytes());
        store.put(&prefix.child(*name), payload).await.unwrap();
    }
}

/// Remote `<base>/<language>/<gender>/model/*`
pub async fn put_remote_model(store: &InMemory, base: &ObjectPath, language: &str, gender: Gender) {
    let prefix = base.child(language).child(gender.as_str()).child("model");
    put_files(store, &prefix, &MODEL_FILES).await;
}

/// Remote `<base>/vocoder/<gender>/<group>/*`
pub async fn put_remote_vocoder(store: &InMemory, base: &ObjectPath, gender: Gender, group: &str) {
    let prefix = base.child("vocoder").child(gender.as_str()).child(group);
    put_files(store, &prefix, &VOCODER_FILES).await;
}

pub fn memory_store() -> (Arc<InMemory>, ObjectPath) {
    (Arc::new(InMemory::new()), ObjectPath::from("models"))
}
