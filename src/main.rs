use clap::{arg,crate_version,Command};
use lz4pack::{lz4, huffman};

const RCH: &str = "unreachable was reached";

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::init();
    let long_help =
"Examples:
---------
Compress:      `lz4pack compress -m lz4 -i my_asset -o my_asset.lz4`
Compress:      `lz4pack compress -m lz4 -l 6 --legacy -i my_asset -o my_asset.lz4`
Compress:      `lz4pack compress -m huffman -i my_asset -o my_asset.huf`
Expand:        `lz4pack expand -m huffman -i my_asset.huf -o my_asset`";

    let methods = ["lz4","huffman"];

    let mut main_cmd = Command::new("lz4pack")
        .about("Compress binary assets with LZ4 or canonical Huffman")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-m --method <METHOD> "compression algorithm").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .arg(arg!(-l --level <LEVEL> "compression level 0-9, lz4 only").required(false))
        .arg(arg!(-w --window <SIZE> "match window 1-65535, lz4 only").required(false))
        .arg(arg!(--legacy "use the LZ4 legacy frame format").required(false))
        .arg(arg!(-D --dictionary <PATH> "seed the match window with a file, lz4 only").required(false))
        .about("compress a file"));

        main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-m --method <METHOD> "compression algorithm").required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("expand a file"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        let mut in_file = std::fs::File::open(path_in)?;
        let mut out_file = std::fs::File::create(path_out)?;
        let (in_size,out_size) = match method.as_str() {
            "lz4" => {
                let mut opt = lz4::STD_OPTIONS;
                if let Some(level) = cmd.get_one::<String>("level") {
                    opt.level = level.parse::<usize>()?;
                }
                if let Some(window) = cmd.get_one::<String>("window") {
                    opt.window = window.parse::<usize>()?;
                }
                opt.legacy = cmd.get_flag("legacy");
                if let Some(path) = cmd.get_one::<String>("dictionary") {
                    opt.dictionary = Some(std::fs::read(path)?);
                }
                lz4::compress(&mut in_file,&mut out_file,&opt)?
            },
            "huffman" => huffman::compress(&mut in_file,&mut out_file,&huffman::STD_OPTIONS)?,
            _ => {
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        eprintln!("compressed {} into {}",in_size,out_size);
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        let mut in_file = std::fs::File::open(path_in)?;
        let (in_size,out_size) = match method.as_str() {
            "huffman" => {
                let mut out_file = std::fs::File::create(path_out)?;
                huffman::expand(&mut in_file,&mut out_file,&huffman::STD_OPTIONS)?
            },
            _ => {
                // LZ4 output is meant for the reference decoders
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        eprintln!("expanded {} into {}",in_size,out_size);
    }

    Ok(())
}
