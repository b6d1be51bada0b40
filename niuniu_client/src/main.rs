use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

use niuniu_core::{calculate_bull, ClientMessage, RoomId, RoomSnapshot, ServerMessage};

const DEFAULT_URL: &str = "ws://127.0.0.1:25917/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(&std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string()))?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => {
                        print_server_message(&server_msg);
                        print!("> "); // 重新显示输入提示符
                        let _ = std::io::stdout().flush();
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 斗牛客户端 ---");
    println!("可用命令:");
    println!("  join <房间号> <昵称>          - 加入房间，不存在时自动创建");
    println!("  reconnect <玩家ID> <凭证>     - 断线重连");
    println!("  ready / unready               - 准备 / 取消准备");
    println!("  bid                           - 抢庄");
    println!("  bet <金额>                    - 下注");
    println!("  show                          - 摊牌");
    println!("  leave                         - 离开房间");
    println!("  exit                          - 退出");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();

        let client_msg = match parts.as_slice() {
            ["join", room_id, nickname] => match room_id.parse::<RoomId>() {
                Ok(room_id) => ClientMessage::JoinRoom { room_id, nickname: nickname.to_string() },
                Err(_) => {
                    println!("无效的房间号: {}", room_id);
                    continue;
                }
            },
            ["join", ..] => {
                println!("用法: join <房间号> <昵称>");
                continue;
            }
            ["reconnect", player_id, secret] => {
                match (Uuid::parse_str(player_id), Uuid::parse_str(secret)) {
                    (Ok(player_id), Ok(secret)) => ClientMessage::Reconnect { player_id, secret },
                    _ => {
                        println!("无效的玩家ID或凭证");
                        continue;
                    }
                }
            }
            ["ready"] => ClientMessage::Ready { ready: true },
            ["unready"] => ClientMessage::Ready { ready: false },
            ["bid"] => ClientMessage::BidBanker,
            ["bet", amount] => match amount.parse::<u32>() {
                Ok(amount) => ClientMessage::PlaceBet { amount },
                Err(_) => {
                    println!("无效的金额: {}", amount);
                    continue;
                }
            },
            ["show"] => ClientMessage::Showdown,
            ["leave"] => ClientMessage::LeaveRoom,
            ["exit"] => {
                println!("正在断开连接...");
                break;
            }
            [] => continue,
            _ => {
                println!("未知命令: {}", line);
                continue;
            }
        };

        let payload = serde_json::to_string(&client_msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    Ok(())
}

fn print_server_message(msg: &ServerMessage) {
    match msg {
        ServerMessage::RoomJoined { your_id, your_secret, snapshot } => {
            println!("\n<-- 已进入房间 {}", snapshot.room_id);
            println!("    玩家ID: {}", your_id);
            println!("    重连凭证: {}", your_secret);
            print_snapshot(snapshot);
        }
        ServerMessage::RoomState(snapshot) => print_snapshot(snapshot),
        ServerMessage::ShowdownResults { results, deltas } => {
            println!("\n<-- 摊牌结果");
            for r in results {
                let hand: Vec<String> = r.hand.iter().map(|c| c.to_string()).collect();
                let delta = deltas.iter().find(|d| d.player_id == r.player_id);
                println!(
                    "    {} [{}] {:?} 下注 {} {} {}",
                    r.player_id,
                    hand.join(" "),
                    r.hand_value.card_type,
                    r.bet,
                    if r.is_winner { "赢" } else { "输" },
                    delta.map_or(String::new(), |d| format!("{:+} => {}", d.delta, d.new_score)),
                );
            }
        }
        ServerMessage::PlayerLeft { player_id } => println!("\n<-- 玩家 {} 离开了房间", player_id),
        ServerMessage::Info { message } => println!("\n<-- {}", message),
        ServerMessage::Error { message } => println!("\n<-- [错误] {}", message),
    }
}

fn print_snapshot(snapshot: &RoomSnapshot) {
    println!("\n<-- 房间 {} 状态 {}", snapshot.room_id, snapshot.state);
    for p in &snapshot.players {
        println!(
            "    {} {} 分数 {} {:?}{}{}",
            p.nickname,
            p.id,
            p.score,
            p.status,
            if p.is_banker { " 庄" } else { "" },
            if p.is_online { "" } else { " (离线)" },
        );
    }
    if !snapshot.your_hand.is_empty() {
        let hand: Vec<String> = snapshot.your_hand.iter().map(|c| c.to_string()).collect();
        let value = calculate_bull(&snapshot.your_hand);
        println!("    你的手牌: {}  {:?}", hand.join(" "), value.card_type);
    }
}
