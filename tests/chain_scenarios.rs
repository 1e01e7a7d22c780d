// End-to-end ledger scenarios

use pow_ledger::chain::{ChainScan, UnspentOutputs};
use pow_ledger::core::Serializable;
use pow_ledger::wallet::new_utxo_transaction;
use pow_ledger::{validate_address, Block, Blockchain, ChainError, Config, Transaction, Wallet};
use std::path::Path;

fn on_disk(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        difficulty: 8,
        ..Config::default()
    }
}

fn create(config: &Config, owner: &Wallet) -> Blockchain {
    let coinbase = Transaction::new_coinbase(&owner.address(), "", config.subsidy).unwrap();
    Blockchain::create(config, coinbase).unwrap()
}

fn values(chain: &Blockchain, wallet: &Wallet) -> Vec<u64> {
    chain
        .find_utxo(&wallet.pub_key_hash())
        .unwrap()
        .iter()
        .map(|out| out.value)
        .collect()
}

#[test]
fn test_send_moves_value_between_addresses() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut chain = create(&Config::ephemeral(), &alice);

    assert_eq!(values(&chain, &alice), vec![10]);
    assert!(values(&chain, &bob).is_empty());

    let tx = new_utxo_transaction(&alice, &bob.address(), 4, &chain).unwrap();
    chain.mine_block(vec![tx]).unwrap();

    assert_eq!(values(&chain, &alice), vec![6]);
    assert_eq!(values(&chain, &bob), vec![4]);
}

#[test]
fn test_chain_walk_and_round_trip() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut chain = create(&Config::ephemeral(), &alice);

    for amount in [1, 1, 1] {
        let tx = new_utxo_transaction(&alice, &bob.address(), amount, &chain).unwrap();
        chain.mine_block(vec![tx]).unwrap();
    }

    let blocks: Vec<Block> = chain.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0].hash, chain.tip());
    assert!(blocks.last().unwrap().is_genesis());

    for pair in blocks.windows(2) {
        assert_eq!(pair[0].prev_hash, Some(pair[1].hash));
    }
    for block in &blocks {
        assert!(chain.proof_of_work().validate(block));
        assert_eq!(&Block::deserialize(&block.serialize()).unwrap(), block);
    }

    assert_eq!(chain.verify_chain().unwrap(), 4);
}

#[test]
fn test_rejected_batch_leaves_store_unchanged() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut chain = create(&Config::ephemeral(), &alice);
    let tip = chain.tip();

    let good = new_utxo_transaction(&alice, &bob.address(), 2, &chain).unwrap();
    let mut bad = good.clone();
    bad.outputs[0].value = 9;

    let err = chain.mine_block(vec![good, bad]).unwrap_err();
    assert!(matches!(err, ChainError::InvalidTransaction(_)));
    assert_eq!(chain.tip(), tip);
    assert_eq!(chain.iter().count(), 1);
    assert_eq!(values(&chain, &alice), vec![10]);
}

#[test]
fn test_spendable_outputs_cover_amount_when_funded() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut chain = create(&Config::ephemeral(), &alice);

    for amount in [3, 2, 4] {
        let tx = new_utxo_transaction(&alice, &bob.address(), amount, &chain).unwrap();
        chain.mine_block(vec![tx]).unwrap();
    }

    let pkh = bob.pub_key_hash();
    let balance = chain.balance(&pkh).unwrap();
    assert_eq!(balance, 9);

    for amount in 0..=balance {
        let (total, selected) = chain.find_spendable_outputs(&pkh, amount).unwrap();
        assert!(total >= amount);

        let spent: u64 = selected
            .iter()
            .map(|(txid, outs)| {
                let tx = chain.find_transaction(&hex::decode(txid).unwrap()).unwrap();
                outs.iter().map(|&i| tx.outputs[i].value).sum::<u64>()
            })
            .sum();
        assert_eq!(spent, total);
    }
}

#[test]
fn test_reopen_persisted_chain() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk(dir.path());
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    let tip = {
        let mut chain = create(&config, &alice);
        let tx = new_utxo_transaction(&alice, &bob.address(), 4, &chain).unwrap();
        chain.mine_block(vec![tx]).unwrap();
        chain.tip()
    };

    let chain = Blockchain::open(&config).unwrap();
    assert_eq!(chain.tip(), tip);
    assert_eq!(values(&chain, &bob), vec![4]);
    drop(chain);

    let coinbase = Transaction::new_coinbase(&alice.address(), "", 10).unwrap();
    assert!(matches!(
        Blockchain::create(&config, coinbase),
        Err(ChainError::StoreAlreadyExists)
    ));
}

#[test]
fn test_open_missing_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk(&dir.path().join("absent"));

    assert!(matches!(Blockchain::open(&config), Err(ChainError::StoreMissing)));
    assert!(!config.db_path().exists());
}

#[test]
fn test_index_built_on_open_matches_scan() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk(dir.path());
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    {
        let mut chain = create(&config, &alice);
        for amount in [5, 2] {
            let tx = new_utxo_transaction(&alice, &bob.address(), amount, &chain).unwrap();
            chain.mine_block(vec![tx]).unwrap();
        }
    }

    // Enabling the index on an existing chain rebuilds it from the blocks
    let indexed = Config {
        utxo_index: true,
        ..config
    };
    let mut chain = Blockchain::open(&indexed).unwrap();
    let tx = new_utxo_transaction(&bob, &alice.address(), 6, &chain).unwrap();
    chain.mine_block(vec![tx]).unwrap();

    for wallet in [&alice, &bob] {
        let pkh = wallet.pub_key_hash();
        assert_eq!(
            chain.unspent_outputs(&pkh).unwrap(),
            ChainScan::new(&chain).unspent_outputs(&pkh).unwrap()
        );
    }
    assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 9);
    assert_eq!(chain.balance(&bob.pub_key_hash()).unwrap(), 1);
}

#[test]
fn test_address_validation() {
    let address = Wallet::generate().address();
    assert!(validate_address(address.as_str()));

    let mut bytes = bs58::decode(address.as_str()).into_vec().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let flipped = bs58::encode(bytes).into_string();
    assert!(!validate_address(&flipped));
}

#[test]
fn test_find_transaction_unknown_id() {
    let chain = create(&Config::ephemeral(), &Wallet::generate());
    assert!(matches!(
        chain.find_transaction(&[0u8; 32]),
        Err(ChainError::TransactionNotFound(_))
    ));
}
