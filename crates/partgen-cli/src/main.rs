use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use clap::Parser;
use partgen::{
    DiskParameters, GPT_ENTRY_MAX, Geometry, GptPartType, Guid, MBR_ENTRY_MAX, PartitionRequest,
    TableMode, encode, plan, write_images,
};

/// Computes a partition layout from declarative partition requests and
/// writes the MBR/GPT structures into an output image.
///
/// For every placed partition, its byte offset and byte size are printed to
/// stdout (one value per line) for consumption by build scripts.
#[derive(Debug, Parser)]
#[command(name = "partgen", version)]
struct Args {
    /// Output image file
    #[arg(short, long)]
    output: PathBuf,

    /// Generate a GUID partition table instead of a legacy MBR
    #[arg(short, long)]
    gpt: bool,

    /// Disk heads, for CHS geometry and cylinder alignment (legacy mode)
    #[arg(long, required_unless_present = "gpt")]
    heads: Option<u32>,

    /// Disk sectors per track (legacy mode)
    #[arg(long, required_unless_present = "gpt")]
    sectors: Option<u32>,

    /// Active (bootable) partition number, 1-based; 0 disables
    #[arg(short, long, default_value_t = 1)]
    active: u32,

    /// Partition alignment in KiB; overrides cylinder alignment
    #[arg(short = 'l', long)]
    align: Option<u64>,

    /// Disk signature written at offset 440 (accepts 0x-prefixed hex)
    #[arg(short = 'S', long, value_parser = parse_u32, default_value = "0x5452574F")]
    signature: u32,

    /// Disk GUID in canonical hyphenated form; defaults to a GUID derived
    /// from the disk signature
    #[arg(short = 'G', long)]
    guid: Option<String>,

    /// Offset of the GPT partition entry array (size units, minimum 1K)
    #[arg(short = 'e', long, value_parser = parse_size)]
    entry_offset: Option<u64>,

    /// Total disk size (size units); enables the alternate GPT. 0 derives
    /// the size from the partition list
    #[arg(short = 'd', long, value_parser = parse_size)]
    disk_size: Option<u64>,

    /// Write the GPT regions to separate .start/.entry/.end files
    /// (implies --disk-size behavior for the alternate table)
    #[arg(short = 'b', long)]
    split: bool,

    /// Skip zero-sized partitions instead of failing
    #[arg(short = 'n', long)]
    ignore_null: bool,

    /// Log placement details to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Default legacy partition type byte (hex) for partitions that do not
    /// set their own
    #[arg(short = 't', long = "type", value_parser = parse_type_byte, default_value = "83")]
    default_type: u8,

    /// Partition request: SIZE[@START][,key=value...]  Sizes take K/M/G
    /// suffixes (plain numbers are KiB). Keys: type=HEX, gpt-type=NAME,
    /// name=TEXT, required, hybrid
    #[arg(short = 'p', long = "part", value_name = "SPEC")]
    parts: Vec<PartSpec>,
}

/// One `--part` occurrence, parsed but not yet resolved against the
/// defaults threaded in from the remaining options.
#[derive(Debug, Clone)]
struct PartSpec {
    size_kb: u64,
    start_kb: u64,
    type_byte: Option<u8>,
    gpt_type: Option<GptPartType>,
    name: Option<String>,
    required: bool,
    hybrid: bool,
}

impl FromStr for PartSpec {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = text.split(',');
        let extent = fields.next().unwrap_or_default();

        let (size_kb, start_kb) = match extent.split_once('@') {
            Some((size, start)) => (parse_size(size)?, parse_size(start)?),
            None => (parse_size(extent)?, 0),
        };

        let mut spec = PartSpec {
            size_kb,
            start_kb,
            type_byte: None,
            gpt_type: None,
            name: None,
            required: false,
            hybrid: false,
        };

        for field in fields {
            match field.split_once('=') {
                Some(("type", value)) => spec.type_byte = Some(parse_type_byte(value)?),
                Some(("gpt-type", value)) => {
                    spec.gpt_type = Some(value.parse().map_err(|e| format!("{e}"))?)
                }
                Some(("name", value)) => spec.name = Some(value.to_string()),
                None if field == "required" => spec.required = true,
                None if field == "hybrid" => spec.hybrid = true,
                _ => return Err(format!("unknown partition field {field:?}")),
            }
        }

        Ok(spec)
    }
}

/// Parses a size argument in KiB: a plain number is KiB, and K/M/G suffixes
/// scale by powers of 1024. Anything after the suffix is an error.
fn parse_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != 'x' && c != 'X')
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);

    let value = parse_u64(number)?;
    let exp = match suffix.to_ascii_lowercase().as_str() {
        "" | "k" => 0,
        "m" => 1,
        "g" => 2,
        _ => return Err(format!("garbage after end of number in {text:?}")),
    };
    Ok(value * (1 << (10 * exp)))
}

fn parse_u64(text: &str) -> Result<u64, String> {
    let result = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    result.map_err(|_| format!("invalid number {text:?}"))
}

fn parse_u32(text: &str) -> Result<u32, String> {
    parse_u64(text)?
        .try_into()
        .map_err(|_| format!("number {text:?} does not fit in 32 bits"))
}

fn parse_type_byte(text: &str) -> Result<u8, String> {
    let text = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u8::from_str_radix(text, 16).map_err(|_| format!("invalid partition type {text:?}"))
}

/// A disk GUID derived from the legacy signature, keeping runs reproducible
/// without requiring an explicit GUID.
fn guid_from_signature(signature: u32) -> Guid {
    Guid::from_fields(
        signature,
        0x2211,
        0x4433,
        [0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0x00],
    )
}

fn build_params(args: &Args) -> anyhow::Result<DiskParameters> {
    let mode = if args.gpt {
        TableMode::Gpt
    } else {
        TableMode::Legacy
    };
    let mut params = DiskParameters::new(mode);

    if mode == TableMode::Legacy {
        let heads = args.heads.context("--heads is required in legacy mode")?;
        let sectors = args.sectors.context("--sectors is required in legacy mode")?;
        if heads == 0 || sectors == 0 {
            bail!("heads and sectors must be positive");
        }
        params.geometry = Geometry { heads, sectors };
    }

    params.align = args.align.map(|kb| kb * 2).filter(|&sectors| sectors > 0);
    params.signature = args.signature;
    params.ignore_null = args.ignore_null;

    let entry_max = match mode {
        TableMode::Legacy => MBR_ENTRY_MAX,
        TableMode::Gpt => GPT_ENTRY_MAX,
    };
    params.active = match args.active as usize {
        0 => None,
        n if n > entry_max => None,
        n => Some(n - 1),
    };

    params.disk_guid = match &args.guid {
        Some(text) => Guid::parse(text)?,
        None => guid_from_signature(args.signature),
    };

    if let Some(offset_kb) = args.entry_offset {
        let sector = offset_kb * 2;
        if sector < partgen::GPT_FIRST_ENTRY_SECTOR {
            bail!("GPT entry offset must be at least 1 KiB");
        }
        params.first_entry_sector = sector;
    }

    if let Some(size_kb) = args.disk_size {
        // Zero means: derive the disk size from the partition list, but
        // still emit the alternate table.
        params.alternate = true;
        if size_kb != 0 {
            let total_sectors = size_kb * 2;
            let min_sectors = 2 * partgen::GPT_TABLE_SECTORS + 3;
            if total_sectors <= min_sectors {
                bail!(
                    "GPT disk size must be larger than {} KiB",
                    min_sectors * partgen::SECTOR_SIZE / 1024
                );
            }
            params.last_usable = Some(total_sectors - partgen::GPT_TABLE_SECTORS - 2);
        }
    }

    if args.split {
        params.alternate = true;
        params.split_image = true;
    }

    Ok(params)
}

fn build_requests(args: &Args) -> anyhow::Result<Vec<PartitionRequest>> {
    let limit = if args.gpt { GPT_ENTRY_MAX } else { MBR_ENTRY_MAX };
    if args.parts.len() > limit {
        bail!("too many partitions: {} (limit {limit})", args.parts.len());
    }

    args.parts
        .iter()
        .map(|spec| {
            let legacy_type = spec.type_byte.unwrap_or(args.default_type);
            Ok(PartitionRequest {
                size: spec.size_kb * 2,
                start: spec.start_kb * 2,
                legacy_type,
                type_guid: spec.gpt_type.map(|t| t.guid()),
                name: spec.name.clone(),
                required: spec.required,
                hybrid: spec.hybrid,
                attributes: spec
                    .gpt_type
                    .map(|t| t.default_attributes())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    let params = build_params(&args)?;
    let requests = build_requests(&args)?;

    let layout = plan(&params, &requests)?;
    let images = encode(&params, &layout);
    write_images(&args.output, &params, &images)
        .with_context(|| format!("writing {}", args.output.display()))?;

    for placed in &layout.plans {
        println!("{}", placed.byte_offset());
        println!("{}", placed.byte_size());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("10"), Ok(10));
        assert_eq!(parse_size("10K"), Ok(10));
        assert_eq!(parse_size("10M"), Ok(10 * 1024));
        assert_eq!(parse_size("2g"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_size("0x10"), Ok(16));
        assert!(parse_size("10MB").is_err());
        assert!(parse_size("ten").is_err());
    }

    #[test]
    fn test_part_spec() {
        let spec: PartSpec = "16M@1M,type=ef,name=EFI,required,hybrid".parse().unwrap();
        assert_eq!(spec.size_kb, 16 * 1024);
        assert_eq!(spec.start_kb, 1024);
        assert_eq!(spec.type_byte, Some(0xEF));
        assert_eq!(spec.name.as_deref(), Some("EFI"));
        assert!(spec.required);
        assert!(spec.hybrid);

        let spec: PartSpec = "10M".parse().unwrap();
        assert_eq!(spec.size_kb, 10 * 1024);
        assert_eq!(spec.start_kb, 0);
        assert_eq!(spec.type_byte, None);

        let spec: PartSpec = "4M,gpt-type=cros_kernel".parse().unwrap();
        assert_eq!(spec.gpt_type, Some(GptPartType::ChromeOsKernel));
        assert!("4M,gpt-type=nonsense".parse::<PartSpec>().is_err());
        assert!("4M,bogus".parse::<PartSpec>().is_err());
    }

    #[test]
    fn test_default_type_threading() {
        let args = Args::parse_from([
            "partgen", "-g", "-o", "out.img", "-t", "2e", "-p", "4M", "-p", "8M,type=83",
        ]);
        let requests = build_requests(&args).unwrap();
        assert_eq!(requests[0].legacy_type, 0x2E);
        assert_eq!(requests[1].legacy_type, 0x83);
    }

    #[test]
    fn test_active_slot_bounds() {
        let args = Args::parse_from(["partgen", "-o", "o", "--heads", "16", "--sectors", "63"]);
        assert_eq!(build_params(&args).unwrap().active, Some(0));

        let args = Args::parse_from([
            "partgen", "-o", "o", "--heads", "16", "--sectors", "63", "-a", "0",
        ]);
        assert_eq!(build_params(&args).unwrap().active, None);

        // Out of range for a legacy table: disabled rather than clamped.
        let args = Args::parse_from([
            "partgen", "-o", "o", "--heads", "16", "--sectors", "63", "-a", "5",
        ]);
        assert_eq!(build_params(&args).unwrap().active, None);
    }

    #[test]
    fn test_disk_size_sets_window() {
        let args = Args::parse_from(["partgen", "-g", "-o", "o", "-d", "1M"]);
        let params = build_params(&args).unwrap();
        assert!(params.alternate);
        assert_eq!(params.last_usable, Some(2048 - 32 - 2));

        // Zero keeps the window open but still enables the alternate.
        let args = Args::parse_from(["partgen", "-g", "-o", "o", "-d", "0"]);
        let params = build_params(&args).unwrap();
        assert!(params.alternate);
        assert_eq!(params.last_usable, None);

        let args = Args::parse_from(["partgen", "-g", "-o", "o", "-d", "33"]);
        assert!(build_params(&args).is_err());
    }
}
