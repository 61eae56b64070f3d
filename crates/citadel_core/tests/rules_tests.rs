//! End-to-end rules scenarios: constructs, Bastion, the two win conditions
//! and Siege Attrition.

use citadel_core::*;

fn find_move(moves: &[Move], pred: impl Fn(&Move) -> bool) -> Move {
    moves
        .iter()
        .copied()
        .find(pred)
        .expect("expected move not generated")
}

// =============================================================================
// Mason Construct
// =============================================================================

#[test]
fn test_mason_construct_targets_and_wall_hp() {
    // Lone White mason on D2, sovereigns on E5/E9, Black minister tucked in
    // the corner out of attack range.
    let mut pos = Position::from_fen("i3s4/9/9/9/4S4/9/9/3M5/9 w Bb - 0 1").unwrap();
    let moves = pos.generate_moves();

    let d2 = parse_coord("D2").unwrap();
    let constructs: Vec<Move> = moves
        .iter()
        .copied()
        .filter(|m| m.kind == MoveType::MasonConstruct && m.from == d2)
        .collect();

    for target in ["D3", "E2", "C2"] {
        let t = parse_coord(target).unwrap();
        assert!(
            constructs.iter().any(|m| m.to == t),
            "missing con D2@{target}"
        );
    }

    // D2 is not a Keep square, so the wall goes up with 1 hit point.
    let con = find_move(&moves, |m| {
        m.kind == MoveType::MasonConstruct && m.to == parse_coord("D3").unwrap()
    });
    pos.make_move(con);
    assert_eq!(
        pos.raw_at(parse_coord("D3").unwrap()),
        make_wall(Color::White, 1)
    );
    assert!(pos.wall_built_last(Color::White));
    assert_eq!(pos.wall_tokens(Color::White), 1);
}

#[test]
fn test_construct_forbidden_while_attacked_or_after_building() {
    // Black catapult stares straight down the D file at the mason: no
    // construct is legal for it.
    let pos = Position::from_fen("3cs4/9/9/9/9/9/9/3M5/4S4 w Bb - 0 1").unwrap();
    let d2 = parse_coord("D2").unwrap();
    assert!(pos
        .generate_moves()
        .iter()
        .all(|m| !(m.kind == MoveType::MasonConstruct && m.from == d2)));

    // Building on two consecutive own turns is forbidden.
    let pos = Position::from_fen("i3s4/9/9/9/4S4/9/9/3M5/9 w Bb w 0 1").unwrap();
    assert!(pos
        .generate_moves()
        .iter()
        .all(|m| m.kind != MoveType::MasonConstruct));
}

// =============================================================================
// Mason Command
// =============================================================================

#[test]
fn test_mason_command_step_and_build() {
    let mut pos = Position::from_fen("4s4/9/9/9/9/9/9/3MI4/4S4 w Bb - 0 1").unwrap();
    let moves = pos.generate_moves();
    let d2 = parse_coord("D2").unwrap();
    let d3 = parse_coord("D3").unwrap();

    let commands: Vec<Move> = moves
        .iter()
        .copied()
        .filter(|m| m.kind == MoveType::MasonCommand && m.from == d2)
        .collect();
    assert!(!commands.is_empty());

    // Forward step with a build back on the vacated square.
    let cmd = find_move(&commands, |m| m.to == d3 && m.aux1 == d2);
    pos.make_move(cmd);
    assert_eq!(pos.raw_at(d3), make_piece(Color::White, PieceType::Mason));
    assert_eq!(pos.raw_at(d2), make_wall(Color::White, 1));
    assert!(pos.wall_built_last(Color::White));
}

#[test]
fn test_mason_command_builds_suppressed_after_building() {
    let pos = Position::from_fen("4s4/9/9/9/9/9/9/3MI4/4S4 w Bb w 0 1").unwrap();
    let commands: Vec<Move> = pos
        .generate_moves()
        .iter()
        .copied()
        .filter(|m| m.kind == MoveType::MasonCommand)
        .collect();
    assert!(!commands.is_empty(), "the step half stays available");
    assert!(commands.iter().all(|m| m.aux1 == SQ_NONE));
}

#[test]
fn test_mason_command_requires_orthogonal_minister() {
    // Minister only diagonally adjacent: no command.
    let pos = Position::from_fen("4s4/9/9/9/9/9/4I4/3M5/4S4 w Bb - 0 1").unwrap();
    assert!(pos
        .generate_moves()
        .iter()
        .all(|m| m.kind != MoveType::MasonCommand));
}

// =============================================================================
// Bastion
// =============================================================================

#[test]
fn test_bastion_generation_and_effects() {
    // Sovereign E4, Minister D4, otherwise empty around them.
    let mut pos = Position::from_fen("s8/9/9/9/9/3IS4/9/9/9 w Bb - 0 1").unwrap();
    let moves = pos.generate_moves();

    let e4 = parse_coord("E4").unwrap();
    let d4 = parse_coord("D4").unwrap();
    let bastions: Vec<Move> = moves
        .iter()
        .copied()
        .filter(|m| m.kind == MoveType::Bastion && m.from == e4 && m.to == d4)
        .collect();

    // Seven empty squares around D4 after the swap: C(7,2) wall pairs.
    assert_eq!(bastions.len(), 21);
    for b in &bastions {
        assert_ne!(b.aux1, b.aux2);
        assert_ne!(b.aux1, e4, "walls may not go on the minister's new square");
        assert_ne!(b.aux2, e4);
    }

    let b = bastions[0];
    pos.make_move(b);
    assert_eq!(pos.sovereign_sq(Color::White), d4);
    assert_eq!(pos.raw_at(e4), make_piece(Color::White, PieceType::Minister));
    assert_eq!(pos.raw_at(b.aux1), make_wall(Color::White, 1));
    assert_eq!(pos.raw_at(b.aux2), make_wall(Color::White, 1));
    assert!(!pos.bastion_right(Color::White));
    assert!(pos.wall_built_last(Color::White));
    assert_eq!(pos.wall_tokens(Color::White), 2);
}

#[test]
fn test_bastion_blocked_without_right_or_after_building() {
    let no_right = Position::from_fen("s8/9/9/9/9/3IS4/9/9/9 w b - 0 1").unwrap();
    assert!(no_right
        .generate_moves()
        .iter()
        .all(|m| m.kind != MoveType::Bastion));

    let built = Position::from_fen("s8/9/9/9/9/3IS4/9/9/9 w Bb w 0 1").unwrap();
    assert!(built
        .generate_moves()
        .iter()
        .all(|m| m.kind != MoveType::Bastion));
}

// =============================================================================
// Entombment
// =============================================================================

#[test]
fn test_entombment_triggers_on_any_finalized_move() {
    // Black sovereign walled into the A9 corner by its own walls.
    let mut pos = Position::from_fen("sw7/ww7/9/9/9/9/9/9/4S4 w Bb - 0 1").unwrap();
    assert!(pos.is_entombed(Color::Black));
    assert!(!pos.game_over(), "entombment only ends the game on a move");

    let m = find_move(&pos.generate_moves(), |m| {
        m.kind == MoveType::Normal && m.from == parse_coord("E1").unwrap()
    });
    pos.make_move(m);

    assert!(pos.game_over());
    assert_eq!(pos.winner(), Some(Color::White));
    assert_eq!(pos.win_reason(), Some(WinReason::Entombment));
    // finalize_turn stops before flipping the side on a win.
    assert_eq!(pos.turn(), Color::White);
    assert_eq!(pos.halfmove(), 0);
}

#[test]
fn test_no_entombment_with_an_open_neighbor() {
    // Same corner but B9 open: play on.
    let mut pos = Position::from_fen("s8/ww7/9/9/9/9/9/9/4S4 w Bb - 0 1").unwrap();
    assert!(!pos.is_entombed(Color::Black));
    let m = find_move(&pos.generate_moves(), |m| m.kind == MoveType::Normal);
    pos.make_move(m);
    assert!(!pos.game_over());
    assert_eq!(pos.turn(), Color::Black);
}

// =============================================================================
// Siege Attrition
// =============================================================================

#[test]
fn test_siege_attrition_disables_sovereign_and_bastion() {
    // Eight reinforced walls: 16 tokens, one over the limit.
    let pos = Position::from_fen("4s4/9/9/9/RRRRRRRR1/9/9/9/3IS4 w Bb - 0 1").unwrap();
    assert_eq!(pos.wall_tokens(Color::White), 16);

    let sov = pos.sovereign_sq(Color::White);
    let moves = pos.generate_moves();
    assert!(moves
        .iter()
        .all(|m| !(m.kind == MoveType::Normal && m.from == sov)));
    assert!(moves.iter().all(|m| m.kind != MoveType::Bastion));

    // The immobilized sovereign also contributes no attacks; F2 is a square
    // only it could reach from E1.
    assert!(!pos.compute_attacks(Color::White).test(sq(7, 5)));
}

#[test]
fn test_fifteen_tokens_is_still_mobile() {
    let pos = Position::from_fen("4s4/9/9/9/RRRRRRRW1/9/9/9/3IS4 w Bb - 0 1").unwrap();
    assert_eq!(pos.wall_tokens(Color::White), 15);

    let sov = pos.sovereign_sq(Color::White);
    let moves = pos.generate_moves();
    assert!(moves
        .iter()
        .any(|m| m.kind == MoveType::Normal && m.from == sov));
    assert!(moves.iter().any(|m| m.kind == MoveType::Bastion));
}

// =============================================================================
// Catapult composites
// =============================================================================

#[test]
fn test_catapult_move_with_adjacent_demolish() {
    // White catapult slides up the E file; a Black wall sits next to E5.
    let mut pos = Position::from_fen("4s4/9/9/3w5/9/9/9/4C4/4S4 w Bb - 0 1").unwrap();
    let e5 = parse_coord("E5").unwrap();
    let d6 = parse_coord("D6").unwrap();

    let moves = pos.generate_moves();
    let with_demo = find_move(&moves, |m| {
        m.kind == MoveType::CatapultMove && m.to == e5 && m.aux1 == d6
    });
    // The plain landing without a demolish is also offered.
    find_move(&moves, |m| {
        m.kind == MoveType::CatapultMove && m.to == e5 && m.aux1 == SQ_NONE
    });

    pos.make_move(with_demo);
    assert_eq!(pos.raw_at(d6), 0, "hp-1 wall removed");
    assert_eq!(pos.wall_tokens(Color::Black), 0);
    assert_eq!(pos.halfmove(), 0);
}

#[test]
fn test_ranged_demolish_blocked_by_pieces() {
    // A Black mason stands between the catapult and the wall.
    let pos = Position::from_fen("4s4/9/9/4w4/4m4/9/9/4C4/4S4 w Bb - 0 1").unwrap();
    assert!(pos
        .generate_moves()
        .iter()
        .all(|m| m.kind != MoveType::CatapultRangedDemolish));
}
