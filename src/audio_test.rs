use super::*;

#[test]
fn wav_header_describes_pcm_payload() {
    let wav = encode_wav(&[0, 1, -1, i16::MAX], 16_000, 1);

    assert_eq!(wav.len(), 44 + 8);
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 8);
    assert_eq!(&wav[8..16], b"WAVEfmt ");
    assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1, "PCM");
    assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1, "channels");
    assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 16_000);
    assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 32_000, "byte rate");
    assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16, "bits");
    assert_eq!(&wav[36..40], b"data");
    assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 8);
    assert_eq!(&wav[44..], &[0, 0, 1, 0, 0xFF, 0xFF, 0xFF, 0x7F]);
}

#[test]
fn stereo_block_align_doubles() {
    let wav = encode_wav(&[], 44_100, 2);
    assert_eq!(wav.len(), 44);
    assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 4);
}

#[test]
fn wav_clip_carries_upload_metadata() {
    let clip = AudioClip::wav(vec![1, 2, 3]);
    assert_eq!(clip.mime, "audio/wav");
    assert_eq!(clip.file_name, "audio.wav");
}

#[test]
fn unavailable_devices_refuse() {
    let mut capture = UnavailableCapture;
    assert!(matches!(capture.start(), Err(AudioError::Unavailable("capture"))));
    assert!(matches!(capture.stop(), Err(AudioError::NotRecording)));
    capture.discard();

    let mut output = UnavailableOutput;
    assert!(output.play(vec![0; 4]).is_err());
}
