use ROLL_WELL::{
    Args, RollDocument, TranscribeConfig, assemble_song, load_roll_file, parse_velocity_mode,
    write_midi_file,
};
use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let document = match (&args.input, args.demo) {
        (_, true) => {
            info!("Using the built-in demo song..!");
            RollDocument::demo()
        }
        (Some(path), false) => {
            info!("Loading pianoroll: '{}'...", path.display());
            load_roll_file(path)?
        }
        (None, false) => bail!("No input pianoroll given..!"),
    };

    let velocity_mode = args.velocity_mode.as_deref().map(parse_velocity_mode);
    let config = document.roll_config(
        args.tempo,
        args.beat_resolution,
        args.lowest_pitch,
        velocity_mode,
        TranscribeConfig {
            default_velocity: args.default_velocity,
            silence_threshold: args.silence_threshold,
            ..TranscribeConfig::default()
        },
    );

    debug!("Transcribing with {:?}", config);

    let song = assemble_song(
        document.pianoroll.view(),
        &document.programs,
        &document.is_drums,
        &document.track_names,
        &config,
    )?;

    if args.dry_run {
        info!(
            "Previewing at most {} notes per track..!",
            args.dry_run_max
        );
        let timeline = song.timeline();
        for track in song.tracks.iter() {
            info!(
                "Track '{}': program={} drum={} notes={}",
                track.metadata.name,
                track.metadata.program,
                track.metadata.is_drum,
                track.notes.len()
            );

            for (i, note) in track.notes.iter().take(args.dry_run_max).enumerate() {
                let (start, end) = timeline.note_seconds(note);
                info!(
                    "  Note {}: pitch={} velocity={} steps={}..{} time_s={:.3} dur_s={:.3}",
                    i,
                    note.pitch,
                    note.velocity,
                    note.onset,
                    note.offset,
                    start,
                    end - start
                );
            }
        }
        return Ok(());
    }

    let Some(output) = args.output.as_ref() else {
        bail!("No output path given..!");
    };

    write_midi_file(&song, output)?;
    info!("Transcription finished, exiting..!");

    Ok(())
}
