//! `ra`: inspect and transform RawArray files.

use rawarray::{header, ConvertOutcome, DiffMode, ElementType, Error, RawArray, ReadRaError};
use std::{env, path::Path, process::ExitCode};

const USAGE: &str = "\
Usage: ra <command> [args]

Commands:
  head [flags|eltype|elbyte|size|ndims] FILE   print the header or one field
  dims FILE                                    print the dimensions
  reshape FILE N1 [N2 ...]                     change the dimensions in place
  compress FILE                                LZ4-compress the data in place
  quantize FILE                                shift integers to the narrowest unsigned type, then compress
  decompress FILE                              decompress the data in place
  convert TYPE SRC DST                         convert SRC to element type TYPE (e.g. f32)
  diff [-1|-2] A B                             compare two files; exits 1 if they differ";

/// What a command asks the process to exit with, short of an error.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Success,
    Differ,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Differ) => ExitCode::from(1),
        Err(Error::Usage(msg)) => {
            if !msg.is_empty() {
                eprintln!("ra: {msg}");
            }
            eprintln!("{USAGE}");
            ExitCode::from(Error::Usage(msg).exit_code())
        }
        Err(err) => {
            eprintln!("ra: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn usage(msg: impl Into<String>) -> Error {
    Error::Usage(msg.into())
}

fn run(args: &[String]) -> Result<Outcome, Error> {
    let (command, rest) = args.split_first().ok_or_else(|| usage(""))?;
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    match (command.as_str(), rest.as_slice()) {
        ("head", [file]) => {
            let header = rawarray::read_header(file)?;
            for warning in header.warnings() {
                eprintln!("ra: warning: {warning}");
            }
            println!("{header}");
        }
        ("head", [field, file]) => {
            let value = match *field {
                "flags" => header::read_flags(file),
                "eltype" => header::read_eltype(file),
                "elbyte" => header::read_elbyte(file),
                "size" => header::read_size(file),
                "ndims" => header::read_ndims(file),
                other => return Err(usage(format!("unknown header field `{other}`"))),
            };
            println!("{}", value.map_err(io_error)?);
        }
        ("dims", [file]) => {
            let dims = header::read_dims(file).map_err(io_error)?;
            let dims: Vec<String> = dims.iter().map(u64::to_string).collect();
            println!("{}", dims.join(" "));
        }
        ("reshape", [file, dims @ ..]) if !dims.is_empty() => {
            let dims = dims
                .iter()
                .map(|n| n.parse::<u64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| usage(format!("invalid dimension: {err}")))?;
            let mut arr = read_array(file)?;
            arr.reshape(&dims)?;
            arr.write(file)?;
        }
        ("compress", [file]) => {
            let mut arr = read_array(file)?;
            arr.compress()?;
            arr.write(file)?;
        }
        ("quantize", [file]) => {
            let mut arr = read_array(file)?;
            if let Some(q) = arr.quantize_and_compress()? {
                eprintln!(
                    "ra: warning: quantized {} to {}; subtracted offset {} is not stored",
                    q.from, q.to, q.offset
                );
            }
            arr.write(file)?;
        }
        ("decompress", [file]) => {
            let mut arr = read_array(file)?;
            arr.decompress()?;
            arr.write(file)?;
        }
        ("convert", [code, src, dst]) => {
            let target = code
                .parse::<ElementType>()
                .map_err(|err| usage(format!("invalid type `{code}`: {err}")))?;
            let mut arr = read_array(src)?;
            if let ConvertOutcome::Converted { warnings } = arr.convert(target)? {
                for warning in warnings {
                    eprintln!("ra: warning: {warning}");
                }
            }
            arr.write(dst)?;
        }
        ("diff", [opts @ .., a, b]) => {
            let mut mode = DiffMode::Exact;
            for opt in opts {
                mode = match *opt {
                    "-1" => DiffMode::L1,
                    "-2" => DiffMode::L2,
                    other => return Err(usage(format!("unknown option `{other}`"))),
                };
            }
            let result = read_array(a)?.diff(&read_array(b)?, mode);
            println!("{result}");
            if !result.is_equal() {
                return Ok(Outcome::Differ);
            }
        }
        (other, _) => return Err(usage(format!("invalid arguments for `{other}`"))),
    }
    Ok(Outcome::Success)
}

/// Reads a whole file, reporting header warnings on stderr.
fn read_array<P: AsRef<Path>>(path: P) -> Result<RawArray, Error> {
    let arr = RawArray::read(path)?;
    for warning in arr.header().warnings() {
        eprintln!("ra: warning: {warning}");
    }
    Ok(arr)
}

fn io_error(err: std::io::Error) -> Error {
    ReadRaError::Io(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawarray::Flags;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn file(dir: &TempDir, name: &str, values: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        RawArray::from_elements(&[values.len() as u64], values)
            .unwrap()
            .write(&path)
            .unwrap();
        path
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    fn exit_code(result: Result<Outcome, Error>) -> u8 {
        result.map(|_| 0).unwrap_or_else(|err| err.exit_code())
    }

    #[test]
    fn bad_arguments_are_usage_errors() {
        assert_eq!(exit_code(run(&[])), 64);
        assert_eq!(exit_code(run(&args(&["head"]))), 64);
        assert_eq!(exit_code(run(&args(&["frobnicate", "a.ra"]))), 64);
        assert_eq!(exit_code(run(&args(&["head", "bogus", "a.ra"]))), 64);
        assert_eq!(exit_code(run(&args(&["reshape", "a.ra", "x"]))), 64);
        assert_eq!(exit_code(run(&args(&["convert", "q8", "a.ra", "b.ra"]))), 64);
        assert_eq!(exit_code(run(&args(&["diff", "-3", "a.ra", "b.ra"]))), 64);
    }

    #[test]
    fn missing_file_exits_66() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ra");
        for command in ["compress", "dims"] {
            let result = run(&args(&[command, path_str(&missing)]));
            assert_eq!(exit_code(result), 66);
        }
        assert_eq!(exit_code(run(&args(&["head", "size", path_str(&missing)]))), 66);
    }

    #[test]
    fn bad_magic_exits_65() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.ra");
        fs::write(&path, [0xab; 64]).unwrap();
        assert_eq!(exit_code(run(&args(&["decompress", path_str(&path)]))), 65);
        assert_eq!(exit_code(run(&args(&["head", path_str(&path)]))), 65);
    }

    #[test]
    fn diff_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.ra", &[0, 1, 2, 3, 4, 5]);
        let b = file(&dir, "b.ra", &[0, 1, 2, 3, 4, 9]);
        let (a, b) = (path_str(&a), path_str(&b));
        assert_eq!(run(&args(&["diff", a, a])).unwrap(), Outcome::Success);
        assert_eq!(run(&args(&["diff", a, b])).unwrap(), Outcome::Differ);
        assert_eq!(run(&args(&["diff", "-1", a, b])).unwrap(), Outcome::Differ);
        assert_eq!(run(&args(&["diff", "-2", b, b])).unwrap(), Outcome::Success);
    }

    #[test]
    fn head_fields_and_dims() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.ra", &[1, 2, 3, 4]);
        for field in ["flags", "eltype", "elbyte", "size", "ndims"] {
            assert_eq!(run(&args(&["head", field, path_str(&path)])).unwrap(), Outcome::Success);
        }
        assert_eq!(run(&args(&["head", path_str(&path)])).unwrap(), Outcome::Success);
        assert_eq!(run(&args(&["dims", path_str(&path)])).unwrap(), Outcome::Success);
    }

    #[test]
    fn reshape_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.ra", &[0; 12]);
        let p = path_str(&path);
        run(&args(&["reshape", p, "3", "4"])).unwrap();
        assert_eq!(header::read_dims(&path).unwrap(), vec![3, 4]);
        assert_eq!(exit_code(run(&args(&["reshape", p, "5"]))), 65);
        assert_eq!(header::read_dims(&path).unwrap(), vec![3, 4]);
    }

    #[test]
    fn transforms_rewrite_files() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u8> = (0..64).map(|i| i % 4).collect();
        let path = file(&dir, "a.ra", &values);
        let p = path_str(&path);

        run(&args(&["compress", p])).unwrap();
        assert_eq!(header::read_flags(&path).unwrap() & Flags::COMPRESSED, Flags::COMPRESSED);
        run(&args(&["decompress", p])).unwrap();
        assert_eq!(header::read_size(&path).unwrap(), 64);

        let wide = dir.path().join("wide.ra");
        run(&args(&["convert", "u32", p, path_str(&wide)])).unwrap();
        assert_eq!(header::read_elbyte(&wide).unwrap(), 4);
        assert_eq!(exit_code(run(&args(&["convert", "s8", p, path_str(&wide)]))), 65);

        run(&args(&["quantize", path_str(&wide)])).unwrap();
        let mut arr = RawArray::read(&wide).unwrap();
        arr.decompress().unwrap();
        assert_eq!(arr.to_elements::<u8>().unwrap(), values);
    }

    #[test]
    fn unknown_flags_still_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.ra");
        RawArray::create("i16", &[8], Flags::from_bits(1 << 9))
            .unwrap()
            .write(&path)
            .unwrap();
        run(&args(&["compress", path_str(&path)])).unwrap();
        let arr = read_array(&path).unwrap();
        assert_eq!(arr.header().warnings().len(), 1);
        assert!(arr.is_compressed());
    }
}
