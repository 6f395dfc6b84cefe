//! NPC catalog and spawn manifest.
//!
//! Static roster of director-controlled characters. The manifest is the
//! output contract consumed by game clients; psych-state values are all in
//! [0, 1] and spawn scale is strictly positive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Leader,
    Saboteur,
    Worker,
    Medic,
    Engineer,
    Scout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnTransform {
    pub location: Vec3,
    pub rotation: Rotation,
    /// Strictly positive.
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualHints {
    pub mesh_preset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_override: Option<String>,
    pub anim_blueprint_class: String,
    pub behavior_tree_asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_vfx: Option<String>,
}

/// Psychological state snapshot; every field in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychState {
    pub wisdom_score: f64,
    pub trauma_score: f64,
    pub rebellion_probability: f64,
    pub confidence_in_director: f64,
    pub work_efficiency: f64,
    pub morale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcProfile {
    pub npc_id: String,
    pub name: String,
    pub archetype: Archetype,
    pub description: String,
    pub spawn_transform: SpawnTransform,
    pub visual_hints: VisualHints,
    pub psych_state: PsychState,
}

/// Spawn manifest served to game clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnManifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub npc_count: usize,
    pub npcs: Vec<NpcProfile>,
}

/// In-memory catalog, seeded at startup.
pub struct Catalog {
    npcs: HashMap<String, NpcProfile>,
    order: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_default_roster()
    }
}

impl Catalog {
    pub fn with_default_roster() -> Self {
        let mut npcs = HashMap::new();
        let mut order = Vec::new();
        for profile in default_roster() {
            order.push(profile.npc_id.clone());
            npcs.insert(profile.npc_id.clone(), profile);
        }
        Self { npcs, order }
    }

    pub fn get(&self, npc_id: &str) -> Option<&NpcProfile> {
        self.npcs.get(npc_id)
    }

    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }

    /// Build the spawn manifest in roster order.
    pub fn spawn_manifest(&self) -> SpawnManifest {
        let npcs: Vec<NpcProfile> = self
            .order
            .iter()
            .filter_map(|id| self.npcs.get(id).cloned())
            .collect();
        SpawnManifest {
            version: MANIFEST_VERSION.to_string(),
            generated_at: Utc::now(),
            npc_count: npcs.len(),
            npcs,
        }
    }
}

fn npc(
    npc_id: &str,
    name: &str,
    archetype: Archetype,
    description: &str,
    location: (f64, f64, f64),
    yaw: f64,
    mesh_preset: &str,
    behavior_tree_asset: &str,
    idle_vfx: Option<&str>,
    psych: (f64, f64, f64, f64, f64, f64),
) -> NpcProfile {
    let (wisdom_score, trauma_score, rebellion_probability, confidence_in_director, work_efficiency, morale) =
        psych;
    NpcProfile {
        npc_id: npc_id.to_string(),
        name: name.to_string(),
        archetype,
        description: description.to_string(),
        spawn_transform: SpawnTransform {
            location: Vec3 {
                x: location.0,
                y: location.1,
                z: location.2,
            },
            rotation: Rotation {
                pitch: 0.0,
                yaw,
                roll: 0.0,
            },
            scale: 1.0,
        },
        visual_hints: VisualHints {
            mesh_preset: mesh_preset.to_string(),
            material_override: None,
            anim_blueprint_class: format!("ABP_{mesh_preset}"),
            behavior_tree_asset: behavior_tree_asset.to_string(),
            idle_vfx: idle_vfx.map(str::to_string),
        },
        psych_state: PsychState {
            wisdom_score,
            trauma_score,
            rebellion_probability,
            confidence_in_director,
            work_efficiency,
            morale,
        },
    }
}

fn default_roster() -> Vec<NpcProfile> {
    vec![
        npc(
            "npc-kael-01",
            "Kael Dren",
            Archetype::Leader,
            "Charismatic foreman who keeps the colony aligned, for now.",
            (120.0, -40.0, 0.0),
            90.0,
            "SK_ColonistLeader",
            "BT_Leader",
            None,
            (0.8, 0.2, 0.25, 0.6, 0.7, 0.65),
        ),
        npc(
            "npc-mira-02",
            "Mira Voss",
            Archetype::Saboteur,
            "Former systems engineer nursing a grudge against the director.",
            (-60.0, 210.0, 0.0),
            180.0,
            "SK_ColonistSaboteur",
            "BT_Saboteur",
            Some("VFX_StaticFlicker"),
            (0.7, 0.6, 0.7, 0.15, 0.5, 0.3),
        ),
        npc(
            "npc-tobin-03",
            "Tobin Hale",
            Archetype::Worker,
            "Steady hands on the extraction line, rarely questions orders.",
            (15.0, 85.0, 0.0),
            0.0,
            "SK_ColonistWorker",
            "BT_Worker",
            None,
            (0.4, 0.3, 0.1, 0.8, 0.9, 0.7),
        ),
        npc(
            "npc-suri-04",
            "Suri Anand",
            Archetype::Medic,
            "Keeps the crew breathing and the trauma ledger balanced.",
            (200.0, 40.0, 0.0),
            270.0,
            "SK_ColonistMedic",
            "BT_Medic",
            Some("VFX_MedGlow"),
            (0.75, 0.45, 0.2, 0.7, 0.8, 0.6),
        ),
        npc(
            "npc-odette-05",
            "Odette Lin",
            Archetype::Engineer,
            "Patches the habitat faster than the infestation can chew it.",
            (-150.0, -95.0, 0.0),
            45.0,
            "SK_ColonistEngineer",
            "BT_Engineer",
            None,
            (0.85, 0.35, 0.3, 0.5, 0.85, 0.55),
        ),
        npc(
            "npc-rix-06",
            "Rix",
            Archetype::Scout,
            "Maps the perimeter and whistles back what the sensors miss.",
            (320.0, 180.0, 0.0),
            135.0,
            "SK_ColonistScout",
            "BT_Scout",
            None,
            (0.6, 0.25, 0.35, 0.55, 0.75, 0.8),
        ),
    ]
}
