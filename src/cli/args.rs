use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;

use crate::instructions::token::NATIVE_MINT;

#[derive(Parser, Debug)]
#[command(name = "sponsor", version, about = "Fee-sponsored swap and transfer relay")]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 sponsor.toml 或 config/sponsor.toml）"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 初始化配置模版文件
    Init(InitCmd),
    /// 加载并校验配置，输出解析结果
    #[command(name = "check-config")]
    CheckConfig,
    /// 为指定钱包构建代付 swap，并以 JSON 输出
    Quote(QuoteCmd),
    /// 构建代付转账
    Transfer(TransferCmd),
    /// 估算转账需要收取的费用
    #[command(name = "estimate-transfer-fee")]
    EstimateTransferFee(TransferCmd),
    /// 构建 swap，用本地私钥签名后提交；遇到 rebuild 会继续签名提交，直到落地或失败
    Submit(SubmitCmd),
    /// 周期性重新报价，并输出每次更新
    Stream(StreamCmd),
}

#[derive(Args, Debug)]
pub struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SwapArgs {
    #[arg(long, value_parser = parse_pubkey, help = "买入的 mint")]
    pub buy: Pubkey,
    #[arg(long, value_parser = parse_pubkey, help = "卖出的 mint")]
    pub sell: Pubkey,
    #[arg(long, help = "卖出数量（卖出 mint 的最小单位）")]
    pub amount: u64,
    #[arg(long, help = "滑点（bps）；省略时使用自动滑点或配置默认值")]
    pub slippage_bps: Option<u16>,
}

#[derive(Args, Debug)]
pub struct QuoteCmd {
    #[arg(long, value_parser = parse_pubkey, help = "构建 swap 的目标钱包")]
    pub wallet: Pubkey,
    #[command(flatten)]
    pub swap: SwapArgs,
    #[arg(long, help = "在响应中附带 fee payer 签名")]
    pub presign: bool,
}

#[derive(Args, Debug)]
pub struct TransferCmd {
    #[arg(long, value_parser = parse_pubkey, help = "转出钱包")]
    pub wallet: Pubkey,
    #[arg(long, value_parser = parse_pubkey)]
    pub recipient: Pubkey,
    #[arg(
        long,
        value_parser = parse_pubkey,
        default_value_t = NATIVE_MINT,
        help = "转账的 mint；native mint 表示 SOL"
    )]
    pub token: Pubkey,
    #[arg(long, help = "数量（最小单位）")]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct SubmitCmd {
    #[arg(long, value_name = "FILE", help = "用户私钥文件（JSON 字节数组或 base58）")]
    pub keypair: PathBuf,
    #[command(flatten)]
    pub swap: SwapArgs,
}

#[derive(Args, Debug)]
pub struct StreamCmd {
    #[arg(long, value_parser = parse_pubkey, help = "构建 swap 的目标钱包")]
    pub wallet: Pubkey,
    #[command(flatten)]
    pub swap: SwapArgs,
    #[arg(long, default_value_t = 30u64, help = "运行秒数，到时自动停止")]
    pub duration_secs: u64,
}

pub fn parse_pubkey(value: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(value.trim()).map_err(|err| format!("invalid address {value}: {err}"))
}
