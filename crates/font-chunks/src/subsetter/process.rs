//! Subsetting with an external `pyftsubset`-compatible program.

use std::{
    collections::BTreeSet,
    ffi::OsString,
    fs,
    path::Path,
    process::{Command, Stdio},
};

use super::{OutputFormat, Subsetter};
use crate::{errors::SubsetError, ranges::encode_ranges};

/// Subsetter invoking an external program with `pyftsubset` command-line conventions.
#[derive(Debug, Clone)]
pub struct ProcessSubsetter {
    program: String,
    layout_features_exclude: Vec<String>,
}

impl ProcessSubsetter {
    /// Creates a subsetter invoking `program` and removing the specified layout features.
    pub fn new(program: &str, layout_features_exclude: Vec<String>) -> Self {
        Self {
            program: program.to_owned(),
            layout_features_exclude,
        }
    }

    fn args(
        &self,
        input: &Path,
        output: &Path,
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Vec<OsString> {
        let unicodes: Vec<_> = encode_ranges(chars.iter().copied())
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut args = vec![
            input.as_os_str().to_owned(),
            format!("--unicodes={}", unicodes.join(",")).into(),
        ];
        if !self.layout_features_exclude.is_empty() {
            let features = self.layout_features_exclude.join(",");
            args.push(format!("--layout-features-={features}").into());
        }
        if format == OutputFormat::Woff2 {
            args.push("--flavor=woff2".into());
        }
        let mut output_arg = OsString::from("--output-file=");
        output_arg.push(output);
        args.push(output_arg);
        args
    }
}

impl Subsetter for ProcessSubsetter {
    fn subset(
        &self,
        font: &[u8],
        chars: &BTreeSet<char>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, SubsetError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.ttf");
        fs::write(&input, font)?;
        let output = dir.path().join("output.bin");

        let args = self.args(&input, &output, chars, format);
        log::trace!("running `{}` with {args:?}", self.program);
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SubsetError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !result.status.success() {
            return Err(SubsetError::Process {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }
        Ok(fs::read(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_arguments() {
        let subsetter = ProcessSubsetter::new("pyftsubset", vec!["halt".into(), "vhal".into()]);
        let chars: BTreeSet<char> = "ABCF\u{4e00}".chars().collect();
        let args = subsetter.args(
            Path::new("/tmp/in.ttf"),
            Path::new("/tmp/out.woff2"),
            &chars,
            OutputFormat::Woff2,
        );
        assert_eq!(
            args,
            [
                "/tmp/in.ttf",
                "--unicodes=U+0041-0043,U+0046,U+4E00",
                "--layout-features-=halt,vhal",
                "--flavor=woff2",
                "--output-file=/tmp/out.woff2",
            ]
        );

        let subsetter = ProcessSubsetter::new("pyftsubset", vec![]);
        let args = subsetter.args(
            Path::new("in.ttf"),
            Path::new("out.ttf"),
            &chars,
            OutputFormat::TrueType,
        );
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let subsetter = ProcessSubsetter::new("/non/existing/pyftsubset", vec![]);
        let err = subsetter
            .subset(b"font", &BTreeSet::from(['a']), OutputFormat::Woff2)
            .unwrap_err();
        assert!(matches!(err, SubsetError::Spawn { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_a_process_error() {
        let subsetter = ProcessSubsetter::new("false", vec![]);
        let err = subsetter
            .subset(b"font", &BTreeSet::from(['a']), OutputFormat::Woff2)
            .unwrap_err();
        assert!(matches!(err, SubsetError::Process { .. }), "{err}");
    }
}
