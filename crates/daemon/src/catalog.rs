//! Codec profile catalog
//!
//! Static mapping from a codec/profile selection to ffmpeg argument
//! fragments. Pure lookup: no side effects, deterministic, safe to call
//! concurrently from any number of jobs. Encoder names and profile
//! spellings follow the ffmpeg encoders this daemon drives: libx264,
//! libx265, prores_ks, dnxhd, and plain stream copy for the remux family.

use autotranscode_config::job::{AudioMode, DnxHrProfile, ProResProfile, VideoCodec, CRF_MAX};
use thiserror::Error;

/// Error type for catalog lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Compression value outside the codec's accepted domain.
    #[error("unsupported profile for {codec}: CRF {crf} outside 0..={max}")]
    UnsupportedProfile {
        codec: &'static str,
        crf: u8,
        max: u8,
    },
}

/// A borrowed arg helper; everything downstream wants owned Strings.
fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Video argument fragment for a codec selection.
///
/// Fails with [`CatalogError::UnsupportedProfile`] when a CRF is out of
/// range. Profile-based families cannot fail: their domains are the enum.
pub fn video_args(codec: &VideoCodec) -> Result<Vec<String>, CatalogError> {
    match *codec {
        VideoCodec::H264 { crf } => {
            check_crf("h264", crf)?;
            Ok(vec![
                "-c:v".into(),
                "libx264".into(),
                "-crf".into(),
                crf.to_string(),
                "-pix_fmt".into(),
                "yuv420p".into(),
            ])
        }
        VideoCodec::H265 { crf } => {
            check_crf("h265", crf)?;
            Ok(vec![
                "-c:v".into(),
                "libx265".into(),
                "-crf".into(),
                crf.to_string(),
            ])
        }
        VideoCodec::ProRes { profile } => Ok(vec![
            "-c:v".into(),
            "prores_ks".into(),
            "-profile:v".into(),
            prores_profile_index(profile).to_string(),
        ]),
        VideoCodec::DnxHr { profile } => Ok(args(&[
            "-c:v",
            "dnxhd",
            "-profile:v",
            dnxhr_profile_name(profile),
            "-pix_fmt",
            "yuv422p",
        ])),
        VideoCodec::Remux => Ok(args(&["-c:v", "copy"])),
    }
}

/// Audio argument fragment, independent of the video selection.
pub fn audio_args(mode: AudioMode) -> Vec<String> {
    match mode {
        AudioMode::Copy => args(&["-c:a", "copy"]),
        AudioMode::Aac => args(&["-c:a", "aac"]),
        AudioMode::Pcm => args(&["-c:a", "pcm_s16le"]),
    }
}

/// Full codec fragment: video args then audio args.
pub fn transcode_args(codec: &VideoCodec, audio: AudioMode) -> Result<Vec<String>, CatalogError> {
    let mut out = video_args(codec)?;
    out.extend(audio_args(audio));
    Ok(out)
}

fn check_crf(codec: &'static str, crf: u8) -> Result<(), CatalogError> {
    if crf > CRF_MAX {
        Err(CatalogError::UnsupportedProfile {
            codec,
            crf,
            max: CRF_MAX,
        })
    } else {
        Ok(())
    }
}

/// `prores_ks` numbers its profiles 0..=4 in tier order.
fn prores_profile_index(profile: ProResProfile) -> u8 {
    match profile {
        ProResProfile::Proxy => 0,
        ProResProfile::Lt => 1,
        ProResProfile::Standard => 2,
        ProResProfile::Hq => 3,
        ProResProfile::P4444 => 4,
    }
}

/// `dnxhd` takes named dnxhr_* profiles.
fn dnxhr_profile_name(profile: DnxHrProfile) -> &'static str {
    match profile {
        DnxHrProfile::Lb => "dnxhr_lb",
        DnxHrProfile::Sq => "dnxhr_sq",
        DnxHrProfile::Hq => "dnxhr_hq",
        DnxHrProfile::Hqx => "dnxhr_hqx",
        DnxHrProfile::P444 => "dnxhr_444",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Helper to check if args contain a flag immediately followed by a value.
    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    // **Property: CRF catalog domain**
    //
    // *For any* CRF within the documented bound the catalog SHALL return a
    // non-error argument list naming the right encoder; *for any* value
    // outside the bound it SHALL fail with UnsupportedProfile.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_crf_catalog_domain(crf in any::<u8>()) {
            let h264 = video_args(&VideoCodec::H264 { crf });
            let h265 = video_args(&VideoCodec::H265 { crf });

            if crf <= CRF_MAX {
                let h264 = h264.expect("in-range CRF should map");
                prop_assert!(has_flag_with_value(&h264, "-c:v", "libx264"));
                prop_assert!(has_flag_with_value(&h264, "-crf", &crf.to_string()));

                let h265 = h265.expect("in-range CRF should map");
                prop_assert!(has_flag_with_value(&h265, "-c:v", "libx265"));
                prop_assert!(has_flag_with_value(&h265, "-crf", &crf.to_string()));
            } else {
                prop_assert_eq!(
                    h264,
                    Err(CatalogError::UnsupportedProfile { codec: "h264", crf, max: CRF_MAX })
                );
                prop_assert!(h265.is_err());
            }
        }

        // Composition is deterministic: same inputs, same args, video before audio.
        #[test]
        fn prop_transcode_args_compose(crf in 0u8..=51) {
            let codec = VideoCodec::H264 { crf };
            let a = transcode_args(&codec, AudioMode::Aac).unwrap();
            let b = transcode_args(&codec, AudioMode::Aac).unwrap();
            prop_assert_eq!(&a, &b);

            let video_len = video_args(&codec).unwrap().len();
            let audio = audio_args(AudioMode::Aac);
            prop_assert_eq!(&a[video_len..], audio.as_slice());
        }
    }

    #[test]
    fn test_prores_profiles_map_to_indices() {
        for (profile, idx) in [
            (ProResProfile::Proxy, "0"),
            (ProResProfile::Lt, "1"),
            (ProResProfile::Standard, "2"),
            (ProResProfile::Hq, "3"),
            (ProResProfile::P4444, "4"),
        ] {
            let args = video_args(&VideoCodec::ProRes { profile }).unwrap();
            assert!(has_flag_with_value(&args, "-c:v", "prores_ks"));
            assert!(
                has_flag_with_value(&args, "-profile:v", idx),
                "profile {} should map to index {}",
                profile,
                idx
            );
        }
    }

    #[test]
    fn test_dnxhr_profiles_map_to_names() {
        for (profile, name) in [
            (DnxHrProfile::Lb, "dnxhr_lb"),
            (DnxHrProfile::Sq, "dnxhr_sq"),
            (DnxHrProfile::Hq, "dnxhr_hq"),
            (DnxHrProfile::Hqx, "dnxhr_hqx"),
            (DnxHrProfile::P444, "dnxhr_444"),
        ] {
            let args = video_args(&VideoCodec::DnxHr { profile }).unwrap();
            assert!(has_flag_with_value(&args, "-c:v", "dnxhd"));
            assert!(has_flag_with_value(&args, "-profile:v", name));
        }
    }

    #[test]
    fn test_remux_is_stream_copy() {
        let args = video_args(&VideoCodec::Remux).unwrap();
        assert_eq!(args, vec!["-c:v".to_string(), "copy".to_string()]);
    }

    #[test]
    fn test_audio_fragments() {
        assert!(has_flag_with_value(
            &audio_args(AudioMode::Copy),
            "-c:a",
            "copy"
        ));
        assert!(has_flag_with_value(
            &audio_args(AudioMode::Aac),
            "-c:a",
            "aac"
        ));
        assert!(has_flag_with_value(
            &audio_args(AudioMode::Pcm),
            "-c:a",
            "pcm_s16le"
        ));
    }

    #[test]
    fn test_remux_with_pcm_audio_still_composes() {
        // Audio maps independently of the video fragment.
        let args = transcode_args(&VideoCodec::Remux, AudioMode::Pcm).unwrap();
        assert!(has_flag_with_value(&args, "-c:v", "copy"));
        assert!(has_flag_with_value(&args, "-c:a", "pcm_s16le"));
    }
}
