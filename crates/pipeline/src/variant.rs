//! Registry of the kernel variants the pipeline can run.
//!
//! A variant is pure data: a GLSL body plus the names its inputs and output
//! are exposed under. Dispatch code never matches on a specific variant, so a
//! new kernel only needs a new enum arm and a [`VariantDescriptor`].

use std::fmt;
use std::str::FromStr;

/// One sampled input of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    /// Identifier the kernel body uses to sample this input.
    pub name: &'static str,
    /// Index into the host-side image list that feeds this input.
    pub slot: usize,
}

/// The write-only storage image a kernel stores its result into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: &'static str,
    /// Texture slot of the output within the run (after every input).
    pub slot: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct VariantDescriptor {
    pub variant: KernelVariant,
    /// Kernel body; must define `void demod_main(ivec2 pixel)`.
    pub source: &'static str,
    pub inputs: &'static [InputBinding],
    pub output: OutputBinding,
    pub summary: &'static str,
}

impl VariantDescriptor {
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Binding number of the texture for the input at `position` in
    /// [`inputs`](Self::inputs); the paired sampler follows it.
    pub(crate) fn texture_binding(position: usize) -> u32 {
        (position as u32) * 2
    }

    pub(crate) fn sampler_binding(position: usize) -> u32 {
        (position as u32) * 2 + 1
    }

    pub(crate) fn output_binding(&self) -> u32 {
        (self.inputs.len() as u32) * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    /// Lighting = frame / albedo.
    Demodulate,
    /// Diffuse plus split-sum specular reconstruction from a BRDF lookup table.
    BrdfDemodulate,
    /// Copies its single input to the output unchanged.
    Identity,
}

impl KernelVariant {
    pub const ALL: [KernelVariant; 3] = [
        KernelVariant::Demodulate,
        KernelVariant::BrdfDemodulate,
        KernelVariant::Identity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KernelVariant::Demodulate => "demodulate",
            KernelVariant::BrdfDemodulate => "brdf-demodulate",
            KernelVariant::Identity => "identity",
        }
    }

    pub fn descriptor(self) -> &'static VariantDescriptor {
        match self {
            KernelVariant::Demodulate => &DEMODULATE,
            KernelVariant::BrdfDemodulate => &BRDF_DEMODULATE,
            KernelVariant::Identity => &IDENTITY,
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelVariant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "demodulate" | "demod" => Ok(KernelVariant::Demodulate),
            "brdf-demodulate" | "brdf" => Ok(KernelVariant::BrdfDemodulate),
            "identity" | "copy" => Ok(KernelVariant::Identity),
            _ => Err(format!(
                "unknown kernel variant '{}'; expected one of: {}",
                value.trim(),
                KernelVariant::ALL
                    .iter()
                    .map(|variant| variant.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

static DEMODULATE: VariantDescriptor = VariantDescriptor {
    variant: KernelVariant::Demodulate,
    source: include_str!("../kernels/demodulate.comp"),
    inputs: &[
        InputBinding {
            name: "frame",
            slot: 0,
        },
        InputBinding {
            name: "albedo",
            slot: 1,
        },
    ],
    output: OutputBinding {
        name: "result",
        slot: 2,
    },
    summary: "divide lit colour by albedo (inputs: frame, albedo)",
};

static BRDF_DEMODULATE: VariantDescriptor = VariantDescriptor {
    variant: KernelVariant::BrdfDemodulate,
    source: include_str!("../kernels/brdf_demodulate.comp"),
    inputs: &[
        InputBinding {
            name: "albedo",
            slot: 0,
        },
        // Motion vector (xy), metallic (z) and roughness (w).
        InputBinding {
            name: "mmr",
            slot: 1,
        },
        InputBinding {
            name: "nov",
            slot: 2,
        },
        InputBinding {
            name: "precomputed",
            slot: 3,
        },
        InputBinding {
            name: "specular",
            slot: 4,
        },
    ],
    output: OutputBinding {
        name: "result",
        slot: 5,
    },
    summary: "reconstruct BRDF response (inputs: albedo, mmr, nov, precomputed, specular)",
};

static IDENTITY: VariantDescriptor = VariantDescriptor {
    variant: KernelVariant::Identity,
    source: include_str!("../kernels/identity.comp"),
    inputs: &[InputBinding {
        name: "source",
        slot: 0,
    }],
    output: OutputBinding {
        name: "result",
        slot: 1,
    },
    summary: "copy the input unchanged (inputs: source)",
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn descriptors_are_self_consistent() {
        for variant in KernelVariant::ALL {
            let descriptor = variant.descriptor();
            assert_eq!(descriptor.variant, variant);

            let slots: HashSet<usize> = descriptor.inputs.iter().map(|i| i.slot).collect();
            let expected: HashSet<usize> = (0..descriptor.input_count()).collect();
            assert_eq!(slots, expected, "{variant} slots must cover every input once");
            assert_eq!(descriptor.output.slot, descriptor.input_count());

            let mut names: HashSet<&str> = HashSet::new();
            for input in descriptor.inputs {
                assert!(is_identifier(input.name), "{variant}: bad name {}", input.name);
                assert!(names.insert(input.name), "{variant}: duplicate {}", input.name);
            }
            assert!(!names.contains(descriptor.output.name));
            assert!(descriptor.source.contains("demod_main"));
        }
    }

    #[test]
    fn shipped_arities() {
        assert_eq!(KernelVariant::Demodulate.descriptor().input_count(), 2);
        assert_eq!(KernelVariant::BrdfDemodulate.descriptor().input_count(), 5);
        assert_eq!(KernelVariant::Identity.descriptor().input_count(), 1);
    }

    #[test]
    fn parses_names_and_aliases() {
        for variant in KernelVariant::ALL {
            assert_eq!(variant.name().parse::<KernelVariant>(), Ok(variant));
        }
        assert_eq!(
            "BRDF_Demodulate".parse::<KernelVariant>(),
            Ok(KernelVariant::BrdfDemodulate)
        );
        assert_eq!(" demod ".parse::<KernelVariant>(), Ok(KernelVariant::Demodulate));
        let err = "blur".parse::<KernelVariant>().unwrap_err();
        assert!(err.contains("identity"));
    }

    #[test]
    fn bindings_interleave_textures_and_samplers() {
        let descriptor = KernelVariant::Demodulate.descriptor();
        assert_eq!(VariantDescriptor::texture_binding(1), 2);
        assert_eq!(VariantDescriptor::sampler_binding(1), 3);
        assert_eq!(descriptor.output_binding(), 4);
    }
}
